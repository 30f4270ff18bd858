use mockito::{Matcher, Server};
use serde_json::json;
use setlist::api::spotify::{cover_art_from_jpeg, cover_art_payload, SpotifyClient};
use setlist::api::PlaylistService;
use setlist::config::Config;
use setlist::models::PlaylistChanges;
use setlist::SetlistError;

fn client_for(base: &str) -> SpotifyClient {
    let cfg = Config::from_toml_str(&format!(
        r#"
client_id = "cid"
api_base = "{base}"
auth_base = "{base}"
requests_per_second = 0
"#
    ))
    .expect("parse config");
    SpotifyClient::new(&cfg)
}

/// Client holding a token that is valid for the next hour.
fn logged_in(rt: &tokio::runtime::Runtime, base: &str) -> SpotifyClient {
    let client = client_for(base);
    let expiry = chrono::Utc::now().timestamp_millis() + 3_600_000;
    rt.block_on(client.set_tokens("tok", "refresh", expiry))
        .expect("install tokens");
    client
}

fn track_item(uri: &str) -> serde_json::Value {
    json!({
        "added_at": "2024-01-01T00:00:00Z",
        "is_local": false,
        "track": {
            "id": uri.rsplit(':').next(),
            "uri": uri,
            "name": format!("Song {}", uri),
            "duration_ms": 200000,
            "album": {"name": "Album"},
            "artists": [{"name": "Artist"}]
        }
    })
}

#[test]
fn get_playlist_follows_next_until_null() {
    let mut server = Server::new();
    let base = server.url();

    let _details = server
        .mock("GET", "/playlists/p1")
        .match_header("authorization", "Bearer tok")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "id": "p1",
                "name": "Road Trip",
                "description": "long drives",
                "public": true,
                "collaborative": false,
                "snapshot_id": "snap-a",
                "images": [{"url": "https://i.scdn.co/x.jpg", "height": 640, "width": 640}]
            })
            .to_string(),
        )
        .create();

    let page1 = server
        .mock("GET", "/playlists/p1/tracks")
        .match_query(Matcher::UrlEncoded("offset".into(), "0".into()))
        .with_status(200)
        .with_body(
            json!({
                "items": [track_item("spotify:track:a"), {"track": null}, track_item("spotify:track:c")],
                "next": format!("{}/playlists/p1/tracks?offset=3&limit=100", base)
            })
            .to_string(),
        )
        .expect(1)
        .create();
    let page2 = server
        .mock("GET", "/playlists/p1/tracks")
        .match_query(Matcher::UrlEncoded("offset".into(), "3".into()))
        .with_status(200)
        .with_body(json!({"items": [track_item("spotify:track:d")], "next": null}).to_string())
        .expect(1)
        .create();

    let rt = tokio::runtime::Runtime::new().expect("rt");
    let client = logged_in(&rt, &base);
    let playlist = rt.block_on(client.get_playlist("p1")).expect("get playlist");

    assert_eq!(playlist.details.name, "Road Trip");
    assert_eq!(playlist.details.desc.as_deref(), Some("long drives"));
    assert!(playlist.details.is_public);
    assert_eq!(playlist.details.snapshot, "snap-a");
    assert_eq!(playlist.details.art.len(), 1);
    assert_eq!(playlist.hidden, 1);

    // The null track is dropped but the others keep their absolute positions.
    let positions: Vec<usize> = playlist.tracks.iter().map(|t| t.index).collect();
    assert_eq!(positions, vec![0, 2, 3]);
    assert_eq!(playlist.tracks[2].uri.as_deref(), Some("spotify:track:d"));
    assert_eq!(playlist.tracks[0].artists, vec!["Artist".to_string()]);
    page1.assert();
    page2.assert();
}

#[test]
fn user_playlists_are_filtered_by_owner() {
    let mut server = Server::new();
    let base = server.url();

    let _p1 = server
        .mock("GET", "/me/playlists")
        .match_query(Matcher::UrlEncoded("offset".into(), "0".into()))
        .with_status(200)
        .with_body(
            json!({
                "items": [
                    {"id": "mine", "name": "Mine", "owner": {"id": "jared"}, "tracks": {"total": 12}, "snapshot_id": "s"},
                    {"id": "theirs", "name": "Followed", "owner": {"id": "someone"}, "tracks": {"total": 3}}
                ],
                "next": format!("{}/me/playlists?offset=2&limit=50", base)
            })
            .to_string(),
        )
        .create();
    let _p2 = server
        .mock("GET", "/me/playlists")
        .match_query(Matcher::UrlEncoded("offset".into(), "2".into()))
        .with_status(200)
        .with_body(
            json!({
                "items": [{"id": "mine2", "name": "Mine too", "owner": {"id": "jared"}, "items": {"total": 4}}],
                "next": null
            })
            .to_string(),
        )
        .create();

    let rt = tokio::runtime::Runtime::new().expect("rt");
    let client = logged_in(&rt, &base);
    let playlists = rt
        .block_on(client.get_user_playlists("jared"))
        .expect("list playlists");

    let ids: Vec<&str> = playlists.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["mine", "mine2"]);
    assert_eq!(playlists[0].track_count, 12);
    assert_eq!(playlists[1].track_count, 4);
}

#[test]
fn add_tracks_is_split_into_batches_of_100() {
    let mut server = Server::new();
    let base = server.url();
    let m = server
        .mock("POST", "/playlists/p1/tracks")
        .with_status(201)
        .with_body(json!({"snapshot_id": "after-add"}).to_string())
        .expect(3)
        .create();

    let uris: Vec<String> = (0..250).map(|i| format!("spotify:track:{}", i)).collect();
    let rt = tokio::runtime::Runtime::new().expect("rt");
    let client = logged_in(&rt, &base);
    let snapshot = rt.block_on(client.add_tracks("p1", &uris)).expect("add");

    assert_eq!(snapshot.as_deref(), Some("after-add"));
    m.assert();
}

#[test]
fn add_no_tracks_sends_nothing() {
    let mut server = Server::new();
    let base = server.url();
    let m = server.mock("POST", "/playlists/p1/tracks").expect(0).create();

    let rt = tokio::runtime::Runtime::new().expect("rt");
    let client = logged_in(&rt, &base);
    let snapshot = rt.block_on(client.add_tracks("p1", &[])).expect("add");
    assert_eq!(snapshot, None);
    m.assert();
}

#[test]
fn positional_delete_threads_snapshot_between_batches() {
    let mut server = Server::new();
    let base = server.url();

    // 150 positions: the first batch holds the highest 100, sent with the
    // caller's snapshot; the second uses the snapshot returned by the first.
    let first = server
        .mock("DELETE", "/playlists/p1/tracks")
        .match_body(Matcher::PartialJson(json!({"snapshot_id": "s0"})))
        .with_status(200)
        .with_body(json!({"snapshot_id": "s1"}).to_string())
        .expect(1)
        .create();
    let second = server
        .mock("DELETE", "/playlists/p1/tracks")
        .match_body(Matcher::PartialJson(json!({"snapshot_id": "s1"})))
        .with_status(200)
        .with_body(json!({"snapshot_id": "s2"}).to_string())
        .expect(1)
        .create();

    let mut positions: Vec<usize> = (0..150).collect();
    positions.push(7); // duplicates are sent once
    let rt = tokio::runtime::Runtime::new().expect("rt");
    let client = logged_in(&rt, &base);
    let snapshot = rt
        .block_on(client.delete_playlist_tracks("p1", "s0", &positions))
        .expect("delete");

    assert_eq!(snapshot, "s2");
    first.assert();
    second.assert();
}

#[test]
fn positional_delete_sends_highest_positions_first() {
    let mut server = Server::new();
    let base = server.url();
    let m = server
        .mock("DELETE", "/playlists/p1/tracks")
        .match_body(Matcher::Json(json!({"positions": [9, 4, 1], "snapshot_id": "s0"})))
        .with_status(200)
        .with_body(json!({"snapshot_id": "s1"}).to_string())
        .expect(1)
        .create();

    let rt = tokio::runtime::Runtime::new().expect("rt");
    let client = logged_in(&rt, &base);
    let snapshot = rt
        .block_on(client.delete_playlist_tracks("p1", "s0", &[4, 1, 9]))
        .expect("delete");
    assert_eq!(snapshot, "s1");
    m.assert();
}

#[test]
fn delete_all_replaces_with_empty_list() {
    let mut server = Server::new();
    let base = server.url();
    let m = server
        .mock("PUT", "/playlists/p1/tracks")
        .match_body(Matcher::Json(json!({"uris": []})))
        .with_status(201)
        .with_body(json!({"snapshot_id": "cleared"}).to_string())
        .expect(1)
        .create();

    let rt = tokio::runtime::Runtime::new().expect("rt");
    let client = logged_in(&rt, &base);
    let snapshot = rt
        .block_on(client.delete_all_playlist_tracks("p1"))
        .expect("clear");
    assert_eq!(snapshot, "cleared");
    m.assert();
}

#[test]
fn rate_limited_response_carries_retry_after() {
    let mut server = Server::new();
    let base = server.url();
    let _m = server
        .mock("POST", "/playlists/p1/tracks")
        .with_status(429)
        .with_header("retry-after", "3")
        .create();

    let rt = tokio::runtime::Runtime::new().expect("rt");
    let client = logged_in(&rt, &base);
    let res = rt.block_on(client.add_tracks("p1", &["spotify:track:x".to_string()]));
    match res {
        Err(SetlistError::RateLimited { retry_after }) => assert_eq!(retry_after, Some(3)),
        other => panic!("expected rate limit, got {:?}", other),
    }
}

#[test]
fn server_error_is_reported_with_context() {
    let mut server = Server::new();
    let base = server.url();
    let _m = server
        .mock("GET", "/me")
        .with_status(500)
        .with_body("boom")
        .create();

    let rt = tokio::runtime::Runtime::new().expect("rt");
    let client = logged_in(&rt, &base);
    let e = rt.block_on(client.get_me()).expect_err("500");
    assert_eq!(e.to_string(), "get profile failed: 500 => boom");
}

#[test]
fn calls_without_session_are_not_authenticated() {
    let rt = tokio::runtime::Runtime::new().expect("rt");
    let client = client_for("http://127.0.0.1:9");
    let res = rt.block_on(client.get_me());
    assert!(matches!(res, Err(SetlistError::NotAuthenticated)));
}

#[test]
fn change_details_uploads_cover_then_metadata() {
    let mut server = Server::new();
    let base = server.url();
    let jpeg = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
    let payload = cover_art_from_jpeg(&jpeg);

    let image = server
        .mock("PUT", "/playlists/p1/images")
        .match_header("content-type", "image/jpeg")
        .match_body(payload.as_str())
        .with_status(202)
        .expect(1)
        .create();
    let meta = server
        .mock("PUT", "/playlists/p1")
        .match_body(Matcher::Json(json!({"name": "New name", "public": false})))
        .with_status(200)
        .expect(1)
        .create();

    let rt = tokio::runtime::Runtime::new().expect("rt");
    let client = logged_in(&rt, &base);
    let changes = PlaylistChanges {
        name: Some("New name".into()),
        public: Some(false),
        art: Some(format!("data:image/jpeg;base64,{}", payload)),
        ..Default::default()
    };
    rt.block_on(client.change_playlist_details("p1", &changes))
        .expect("change details");
    image.assert();
    meta.assert();
}

#[test]
fn change_details_without_metadata_skips_metadata_request() {
    let mut server = Server::new();
    let base = server.url();
    let payload = cover_art_from_jpeg(&[0xFF, 0xD8, 0xFF, 0xDB]);
    let _image = server
        .mock("PUT", "/playlists/p1/images")
        .with_status(202)
        .create();
    let meta = server.mock("PUT", "/playlists/p1").expect(0).create();

    let rt = tokio::runtime::Runtime::new().expect("rt");
    let client = logged_in(&rt, &base);
    let changes = PlaylistChanges {
        art: Some(payload),
        ..Default::default()
    };
    rt.block_on(client.change_playlist_details("p1", &changes))
        .expect("upload");
    meta.assert();
}

#[test]
fn cover_art_is_validated_before_upload() {
    assert!(matches!(
        cover_art_payload(""),
        Err(SetlistError::InvalidCoverArt(_))
    ));
    assert!(matches!(
        cover_art_payload("data:image/jpeg;base64,!!!not base64"),
        Err(SetlistError::InvalidCoverArt(_))
    ));
    // PNG signature
    let png = cover_art_from_jpeg(&[0x89, b'P', b'N', b'G']);
    assert!(matches!(
        cover_art_payload(&png),
        Err(SetlistError::InvalidCoverArt(_))
    ));
    let huge = "A".repeat(setlist::api::spotify::MAX_COVER_ART_BYTES + 4);
    assert!(matches!(
        cover_art_payload(&huge),
        Err(SetlistError::InvalidCoverArt(_))
    ));

    let ok = cover_art_from_jpeg(&[0xFF, 0xD8, 0xFF]);
    assert_eq!(
        cover_art_payload(&format!("data:image/jpeg;base64,{}", ok)).expect("valid"),
        ok
    );
}

#[test]
fn reorder_refuses_playlist_with_unavailable_entries() {
    let mut server = Server::new();
    let base = server.url();
    let _details = server
        .mock("GET", "/playlists/p1")
        .with_status(200)
        .with_body(json!({"id": "p1", "name": "Gaps", "snapshot_id": "s0"}).to_string())
        .create();
    let _tracks = server
        .mock("GET", "/playlists/p1/tracks")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            json!({
                "items": [track_item("spotify:track:a"), {"track": null}, track_item("spotify:track:c")],
                "next": null
            })
            .to_string(),
        )
        .create();
    let clear = server.mock("PUT", "/playlists/p1/tracks").expect(0).create();
    let add = server.mock("POST", "/playlists/p1/tracks").expect(0).create();

    let rt = tokio::runtime::Runtime::new().expect("rt");
    let client = logged_in(&rt, &base);
    let playlist = rt.block_on(client.get_playlist("p1")).expect("get playlist");
    assert_eq!(playlist.tracks.len(), 2);

    let res = rt.block_on(client.reorder_playlist_tracks("p1", &playlist.tracks, &[1], None, playlist.hidden));
    assert!(matches!(res, Err(SetlistError::UnmovableTracks(1))));
    let res = rt.block_on(client.shuffle_playlist("p1", &playlist.tracks, playlist.hidden));
    assert!(matches!(res, Err(SetlistError::UnmovableTracks(1))));
    clear.assert();
    add.assert();
}
