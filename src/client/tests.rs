use chrono::{TimeZone, Utc};

use super::{ClientSession, SessionCookie};

#[test]
fn test_extracts_named_cookie() {
    let cookie = SessionCookie::new("SSID", 3600);
    assert_eq!(
        cookie.extract(["theme=dark; SSID=abc-123; lang=en"]),
        Some("abc-123".to_string())
    );
    assert_eq!(
        cookie.extract(["theme=dark", "SSID=\"quoted\""]),
        Some("quoted".to_string())
    );
}

#[test]
fn test_ignores_similar_names_and_empty_values() {
    let cookie = SessionCookie::new("SSID", 3600);
    assert_eq!(cookie.extract(["XSSID=nope; SSIDX=nope"]), None);
    assert_eq!(cookie.extract(["SSID="]), None);
    assert_eq!(cookie.extract(Vec::<&str>::new()), None);
}

#[test]
fn test_resolve_keeps_or_mints() {
    let cookie = SessionCookie::new("SSID", 3600);
    assert_eq!(
        cookie.resolve(["SSID=known"]),
        ClientSession {
            id: "known".to_string(),
            fresh: false
        }
    );

    let minted = cookie.resolve(["other=1"]);
    assert!(minted.fresh);
    assert_eq!(minted.id.len(), 36);
    assert_ne!(cookie.resolve(["other=1"]).id, minted.id);
}

#[test]
fn test_set_cookie_expires_after_ttl() {
    let cookie = SessionCookie::new("SSID", 3600);
    let now = Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap();
    assert_eq!(
        cookie.set_cookie("abc", now),
        "SSID=abc; Path=/; Expires=Tue, 05-Mar-2024 11:00:00 UTC"
    );
}
