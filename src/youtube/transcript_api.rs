//! Caption retrieval through the public watch page and the innertube player.
//!
//! Flow: watch page HTML -> `INNERTUBE_API_KEY` -> player response ->
//! caption track list -> timed text in `json3` format.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use super::{TranscriptError, TranscriptSegment, TranscriptSource};
use crate::scrapers::HttpClient;
use crate::video_id::VideoId;

pub const DEFAULT_BASE_URL: &str = "https://www.youtube.com";

const INNERTUBE_CLIENT_NAME: &str = "ANDROID";
const INNERTUBE_CLIENT_VERSION: &str = "20.10.38";

static INNERTUBE_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""INNERTUBE_API_KEY":\s*"([a-zA-Z0-9_-]+)""#).expect("valid regex")
});

/// A caption track advertised by the player response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionTrack {
    pub language_code: String,
    pub base_url: String,
    /// Automatic speech recognition track.
    pub is_generated: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimedText {
    #[serde(default)]
    events: Vec<TimedTextEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimedTextEvent {
    #[serde(default)]
    t_start_ms: u64,
    #[serde(default)]
    d_duration_ms: u64,
    #[serde(default)]
    segs: Vec<TimedTextSeg>,
}

#[derive(Debug, Deserialize)]
struct TimedTextSeg {
    #[serde(default)]
    utf8: String,
}

/// Transcript client that scrapes caption tracks.
#[derive(Debug, Clone)]
pub struct TranscriptClient {
    http: HttpClient,
    base_url: String,
}

impl TranscriptClient {
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn fetch_watch_page(&self, video_id: &VideoId) -> Result<String, TranscriptError> {
        let url = format!("{}/watch", self.base_url);
        let response = self.http.get(&url, &[("v", video_id.as_str())]).await?;
        if response.status.as_u16() == 429 {
            return Err(TranscriptError::Blocked(video_id.to_string()));
        }
        if !response.is_success() {
            return Err(TranscriptError::Status {
                status: response.status.as_u16(),
                url,
            });
        }
        Ok(response.text().await?)
    }

    async fn fetch_player_response(
        &self,
        video_id: &VideoId,
        api_key: &str,
    ) -> Result<Value, TranscriptError> {
        let url = format!(
            "{}/youtubei/v1/player?key={}",
            self.base_url,
            urlencoding::encode(api_key)
        );
        let body = json!({
            "context": {
                "client": {
                    "clientName": INNERTUBE_CLIENT_NAME,
                    "clientVersion": INNERTUBE_CLIENT_VERSION,
                }
            },
            "videoId": video_id.as_str(),
        });

        let response = self.http.post_json(&url, &[], &body).await?;
        if !response.is_success() {
            return Err(TranscriptError::Status {
                status: response.status.as_u16(),
                url: format!("{}/youtubei/v1/player", self.base_url),
            });
        }
        response
            .json()
            .await
            .map_err(|e| TranscriptError::Parse(e.to_string()))
    }

    async fn fetch_timed_text(
        &self,
        track: &CaptionTrack,
    ) -> Result<Vec<TranscriptSegment>, TranscriptError> {
        let url = json3_url(&track.base_url)?;
        let response = self.http.get(&url, &[]).await?;
        if !response.is_success() {
            return Err(TranscriptError::Status {
                status: response.status.as_u16(),
                url: track.base_url.clone(),
            });
        }
        let body = response.text().await?;
        parse_timed_text(&body)
    }
}

#[async_trait]
impl TranscriptSource for TranscriptClient {
    async fn transcript(
        &self,
        video_id: &VideoId,
        language: &str,
    ) -> Result<Vec<TranscriptSegment>, TranscriptError> {
        let html = self.fetch_watch_page(video_id).await?;
        let api_key = extract_innertube_key(&html, video_id)?;
        let player = self.fetch_player_response(video_id, &api_key).await?;
        let tracks = caption_tracks(&player, video_id)?;
        let track = select_track(&tracks, language).ok_or_else(|| TranscriptError::NotFound {
            video_id: video_id.to_string(),
            language: language.to_string(),
        })?;

        debug!(
            "Using {} caption track '{}' for {}",
            if track.is_generated { "generated" } else { "manual" },
            track.language_code,
            video_id
        );
        self.fetch_timed_text(track).await
    }
}

/// Pull the innertube API key out of the watch page.
pub fn extract_innertube_key(html: &str, video_id: &VideoId) -> Result<String, TranscriptError> {
    if html.contains("class=\"g-recaptcha\"") {
        return Err(TranscriptError::Blocked(video_id.to_string()));
    }
    INNERTUBE_KEY_RE
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| TranscriptError::Parse("INNERTUBE_API_KEY not found in watch page".into()))
}

/// Read the caption track list out of a player response.
///
/// A missing caption renderer or an empty track list means transcripts are
/// disabled for the video.
pub fn caption_tracks(
    player: &Value,
    video_id: &VideoId,
) -> Result<Vec<CaptionTrack>, TranscriptError> {
    check_playability(player, video_id)?;

    let Some(renderer) = player
        .get("captions")
        .and_then(|c| c.get("playerCaptionsTracklistRenderer"))
    else {
        return Err(TranscriptError::Disabled(video_id.to_string()));
    };

    let tracks: Vec<CaptionTrack> = renderer
        .get("captionTracks")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|track| {
                    Some(CaptionTrack {
                        language_code: track.get("languageCode")?.as_str()?.to_string(),
                        base_url: track.get("baseUrl")?.as_str()?.to_string(),
                        is_generated: track.get("kind").and_then(Value::as_str) == Some("asr"),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    if tracks.is_empty() {
        return Err(TranscriptError::Disabled(video_id.to_string()));
    }
    Ok(tracks)
}

fn check_playability(player: &Value, video_id: &VideoId) -> Result<(), TranscriptError> {
    let Some(status) = player.get("playabilityStatus") else {
        return Ok(());
    };
    let code = status.get("status").and_then(Value::as_str).unwrap_or("OK");
    if code == "OK" {
        return Ok(());
    }

    let reason = status
        .get("reason")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    if code == "LOGIN_REQUIRED" && reason.contains("not a bot") {
        return Err(TranscriptError::Blocked(video_id.to_string()));
    }
    Err(TranscriptError::Unplayable {
        video_id: video_id.to_string(),
        reason: if reason.is_empty() { code.to_string() } else { reason },
    })
}

/// Prefer a manual track over a generated one; `en` also matches `en-US`.
pub fn select_track<'a>(tracks: &'a [CaptionTrack], language: &str) -> Option<&'a CaptionTrack> {
    let exact = |t: &&CaptionTrack| t.language_code.eq_ignore_ascii_case(language);
    let regional = |t: &&CaptionTrack| {
        t.language_code
            .split_once('-')
            .map(|(base, _)| base.eq_ignore_ascii_case(language))
            .unwrap_or(false)
    };

    let manual = || tracks.iter().filter(|t| !t.is_generated);
    let generated = || tracks.iter().filter(|t| t.is_generated);

    manual()
        .find(exact)
        .or_else(|| generated().find(exact))
        .or_else(|| manual().find(regional))
        .or_else(|| generated().find(regional))
}

/// Rewrite a track URL to request the `json3` format.
fn json3_url(base_url: &str) -> Result<String, TranscriptError> {
    let mut url = Url::parse(base_url)
        .map_err(|e| TranscriptError::Parse(format!("bad caption URL {}: {}", base_url, e)))?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "fmt")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("fmt", "json3");
    Ok(url.to_string())
}

/// Parse a `json3` timed-text document into ordered segments.
pub fn parse_timed_text(body: &str) -> Result<Vec<TranscriptSegment>, TranscriptError> {
    let timed: TimedText =
        serde_json::from_str(body).map_err(|e| TranscriptError::Parse(e.to_string()))?;

    let mut segments: Vec<TranscriptSegment> = timed
        .events
        .into_iter()
        .filter_map(|event| {
            let raw: String = event.segs.iter().map(|s| s.utf8.as_str()).collect();
            let text = raw.split_whitespace().collect::<Vec<_>>().join(" ");
            if text.is_empty() {
                return None;
            }
            Some(TranscriptSegment {
                text,
                start: event.t_start_ms as f64 / 1000.0,
                duration: event.d_duration_ms as f64 / 1000.0,
            })
        })
        .collect();
    segments.sort_by(|a, b| a.start.total_cmp(&b.start));
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use std::time::Duration;

    fn vid() -> VideoId {
        VideoId::new("abc12345678").unwrap()
    }

    fn track(lang: &str, generated: bool) -> CaptionTrack {
        CaptionTrack {
            language_code: lang.to_string(),
            base_url: format!("https://www.youtube.com/api/timedtext?lang={}", lang),
            is_generated: generated,
        }
    }

    #[test]
    fn test_extract_innertube_key() {
        let html = r#"<script>ytcfg.set({"INNERTUBE_API_KEY": "AIzaSyA-test_key"});</script>"#;
        assert_eq!(extract_innertube_key(html, &vid()).unwrap(), "AIzaSyA-test_key");

        assert!(matches!(
            extract_innertube_key("<html></html>", &vid()),
            Err(TranscriptError::Parse(_))
        ));
        assert!(matches!(
            extract_innertube_key(r#"<div class="g-recaptcha"></div>"#, &vid()),
            Err(TranscriptError::Blocked(_))
        ));
    }

    #[test]
    fn test_caption_tracks_disabled() {
        let no_renderer = json!({"playabilityStatus": {"status": "OK"}});
        assert!(matches!(
            caption_tracks(&no_renderer, &vid()),
            Err(TranscriptError::Disabled(_))
        ));

        let empty = json!({"captions": {"playerCaptionsTracklistRenderer": {"captionTracks": []}}});
        assert!(matches!(
            caption_tracks(&empty, &vid()),
            Err(TranscriptError::Disabled(_))
        ));
    }

    #[test]
    fn test_caption_tracks_unplayable() {
        let player = json!({"playabilityStatus": {"status": "ERROR", "reason": "Video unavailable"}});
        match caption_tracks(&player, &vid()) {
            Err(TranscriptError::Unplayable { reason, .. }) => assert_eq!(reason, "Video unavailable"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_select_track_prefers_manual_exact() {
        let tracks = vec![track("en", true), track("de", false), track("en", false)];
        let chosen = select_track(&tracks, "en").unwrap();
        assert!(!chosen.is_generated);

        let tracks = vec![track("en-US", false), track("en", true)];
        assert!(select_track(&tracks, "en").unwrap().is_generated);

        let tracks = vec![track("en-GB", false)];
        assert_eq!(select_track(&tracks, "en").unwrap().language_code, "en-GB");
        assert!(select_track(&tracks, "fr").is_none());
    }

    #[test]
    fn test_json3_url_replaces_format() {
        let url = json3_url("https://www.youtube.com/api/timedtext?v=abc&fmt=srv3&lang=en").unwrap();
        assert!(url.contains("fmt=json3"));
        assert!(!url.contains("srv3"));
        assert!(url.contains("lang=en"));
    }

    #[test]
    fn test_parse_timed_text() {
        let body = r#"{"events":[
            {"tStartMs": 1500, "dDurationMs": 1000, "segs": [{"utf8": "world"}]},
            {"tStartMs": 0, "dDurationMs": 1500, "segs": [{"utf8": "hello"}, {"utf8": "\n"}]},
            {"tStartMs": 2500, "dDurationMs": 10},
            {"tStartMs": 2600, "dDurationMs": 900, "segs": [{"utf8": " testing "}]}
        ]}"#;
        let segments = parse_timed_text(body).unwrap();
        let texts: Vec<&str> = segments.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["hello", "world", "testing"]);
        assert_eq!(segments[1].start, 1.5);
        assert_eq!(segments[0].duration, 1.5);
    }

    #[tokio::test]
    async fn test_full_transcript_flow() {
        let mut server = mockito::Server::new_async().await;
        let base = server.url();

        server
            .mock("GET", "/watch")
            .match_query(Matcher::UrlEncoded("v".into(), "abc12345678".into()))
            .with_status(200)
            .with_body(r#"<html>"INNERTUBE_API_KEY":"KEY123"</html>"#)
            .create_async()
            .await;
        server
            .mock("POST", "/youtubei/v1/player")
            .match_query(Matcher::UrlEncoded("key".into(), "KEY123".into()))
            .match_body(Matcher::PartialJson(json!({"videoId": "abc12345678"})))
            .with_status(200)
            .with_body(
                json!({
                    "playabilityStatus": {"status": "OK"},
                    "captions": {"playerCaptionsTracklistRenderer": {"captionTracks": [
                        {"languageCode": "en", "kind": "asr",
                         "baseUrl": format!("{}/api/timedtext?v=abc12345678&lang=en", base)}
                    ]}}
                })
                .to_string(),
            )
            .create_async()
            .await;
        server
            .mock("GET", "/api/timedtext")
            .match_query(Matcher::UrlEncoded("fmt".into(), "json3".into()))
            .with_status(200)
            .with_body(
                r#"{"events":[{"tStartMs":0,"dDurationMs":900,"segs":[{"utf8":"hello world"}]},
                              {"tStartMs":900,"dDurationMs":900,"segs":[{"utf8":"testing"}]}]}"#,
            )
            .create_async()
            .await;

        let http = HttpClient::new(Duration::from_secs(5)).unwrap();
        let client = TranscriptClient::new(http).with_base_url(base.clone());
        let segments = client.transcript(&vid(), "en").await.unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "hello world");

        let err = client.transcript(&vid(), "fr").await.unwrap_err();
        assert!(matches!(err, TranscriptError::NotFound { .. }));
        assert!(err.is_terminal());
    }
}
