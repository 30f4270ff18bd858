use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;
use setlist::models::Track;
use setlist::transform::{
    decode_playlist_tracks, filter_user_playlists, reorder_tracks, rewrite_uris, shuffle_tracks,
};
use setlist::SetlistError;

fn tracks(names: &[&str]) -> Vec<Track> {
    names
        .iter()
        .enumerate()
        .map(|(i, n)| Track {
            index: i,
            id: Some(n.to_string()),
            uri: Some(format!("spotify:track:{}", n)),
            name: n.to_string(),
            artists: vec![],
            album: String::new(),
            duration_ms: 0,
            added_at: None,
            is_local: false,
            checked: false,
        })
        .collect()
}

fn names(ts: &[Track]) -> Vec<&str> {
    ts.iter().map(|t| t.name.as_str()).collect()
}

#[test]
fn decode_keeps_absolute_positions_and_local_flag() {
    let items = vec![
        json!({"added_at": "2023-05-01T10:00:00Z", "is_local": false, "track": {
            "id": "1", "uri": "spotify:track:1", "name": "One", "duration_ms": 1000,
            "album": {"name": "LP"}, "artists": [{"name": "A"}, {"name": "B"}]
        }}),
        json!({"track": null}),
        json!({"is_local": true, "track": {
            "id": null, "uri": "spotify:local:x", "name": "Local", "duration_ms": 5,
            "album": {"name": ""}, "artists": []
        }}),
    ];
    let decoded = decode_playlist_tracks(&items);
    assert_eq!(decoded.len(), 2);
    assert_eq!(decoded[0].index, 0);
    assert_eq!(decoded[0].artists, vec!["A".to_string(), "B".to_string()]);
    assert_eq!(decoded[0].album, "LP");
    assert_eq!(decoded[0].added_at.as_deref(), Some("2023-05-01T10:00:00Z"));
    assert_eq!(decoded[1].index, 2);
    assert!(decoded[1].is_local);
    assert_eq!(decoded[1].id, None);
    assert!(!decoded[1].is_addable());
}

#[test]
fn filter_keeps_only_owned_playlists() {
    let raw = vec![
        json!({"id": "a", "name": "A", "owner": {"id": "me"}, "tracks": {"total": 2}, "public": true}),
        json!({"id": "b", "name": "B", "owner": {"id": "you"}, "tracks": {"total": 9}}),
        json!({"id": "c", "name": "C", "owner": {"id": "me"}, "collaborative": true}),
    ];
    let mine = filter_user_playlists(&raw, "me");
    assert_eq!(mine.len(), 2);
    assert_eq!(mine[0].id, "a");
    assert!(mine[0].is_public);
    assert_eq!(mine[0].track_count, 2);
    assert_eq!(mine[1].track_count, 0);
    assert!(mine[1].is_collab);
    assert!(filter_user_playlists(&raw, "nobody").is_empty());
}

#[test]
fn reorder_moves_block_to_top() {
    let out = reorder_tracks(&tracks(&["a", "b", "c", "d", "e"]), &[3, 4], None).unwrap();
    assert_eq!(names(&out), vec!["d", "e", "a", "b", "c"]);
    let idx: Vec<usize> = out.iter().map(|t| t.index).collect();
    assert_eq!(idx, vec![0, 1, 2, 3, 4]);
}

#[test]
fn reorder_places_block_after_target() {
    let out = reorder_tracks(&tracks(&["a", "b", "c", "d", "e"]), &[0, 1], Some(3)).unwrap();
    assert_eq!(names(&out), vec!["c", "d", "a", "b", "e"]);
}

#[test]
fn reorder_keeps_relative_order_of_selection() {
    // selection order does not matter, playlist order is kept
    let out = reorder_tracks(&tracks(&["a", "b", "c", "d", "e"]), &[4, 1], Some(2)).unwrap();
    assert_eq!(names(&out), vec!["a", "c", "b", "e", "d"]);
}

#[test]
fn reorder_after_selected_track_is_stable() {
    let input = tracks(&["a", "b", "c", "d", "e"]);
    let out = reorder_tracks(&input, &[1, 2], Some(2)).unwrap();
    assert_eq!(names(&out), names(&input));
}

#[test]
fn reorder_to_end_and_clears_checks() {
    let mut input = tracks(&["a", "b", "c"]);
    input[0].checked = true;
    let out = reorder_tracks(&input, &[0], Some(2)).unwrap();
    assert_eq!(names(&out), vec!["b", "c", "a"]);
    assert!(out.iter().all(|t| !t.checked));
}

#[test]
fn reorder_rejects_out_of_range_positions() {
    let input = tracks(&["a", "b", "c", "d", "e"]);
    match reorder_tracks(&input, &[1, 5], None) {
        Err(SetlistError::InvalidTrackIndex { index, len }) => {
            assert_eq!(index, 5);
            assert_eq!(len, 5);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(
        reorder_tracks(&input, &[1], Some(9)),
        Err(SetlistError::InvalidTrackIndex { index: 9, .. })
    ));
}

#[test]
fn shuffle_is_a_permutation() {
    let input = tracks(&["a", "b", "c", "d", "e", "f", "g", "h"]);
    let mut rng = StdRng::seed_from_u64(7);
    let out = shuffle_tracks(&input, &mut rng);

    assert_eq!(out.len(), input.len());
    let mut sorted: Vec<&str> = names(&out);
    sorted.sort_unstable();
    assert_eq!(sorted, names(&input));
    for (i, t) in out.iter().enumerate() {
        assert_eq!(t.index, i);
    }

    // same seed, same order
    let mut rng = StdRng::seed_from_u64(7);
    assert_eq!(names(&shuffle_tracks(&input, &mut rng)), names(&out));
}

#[test]
fn shuffle_of_empty_playlist_is_empty() {
    let mut rng = StdRng::seed_from_u64(1);
    assert!(shuffle_tracks(&[], &mut rng).is_empty());
}

#[test]
fn rewrite_uris_refuses_local_tracks() {
    let mut input = tracks(&["a", "b", "c"]);
    assert_eq!(
        rewrite_uris(&input, 0).unwrap(),
        vec!["spotify:track:a", "spotify:track:b", "spotify:track:c"]
    );

    input[1].is_local = true;
    input[2].uri = None;
    assert!(matches!(rewrite_uris(&input, 0), Err(SetlistError::UnmovableTracks(2))));
}

#[test]
fn rewrite_uris_counts_unavailable_entries() {
    let input = tracks(&["a", "b"]);
    assert!(matches!(rewrite_uris(&input, 1), Err(SetlistError::UnmovableTracks(1))));
}
