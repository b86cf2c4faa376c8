mod support;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hitter_core::shorturl::Resolution;
use hitter_core::signing::hmac_sha256_hex;
use hitter_core::store::{ExpiringStore, InMemoryExpiringStore, PutOutcome};
use hitter_slack::commands::{
    CommandContext, CommandError, CommandHandler, CommandHelp, CommandReply, CommandRequest,
};
use hitter_slack::processor::{ProcessingStage, WebhookRequest};
use hitter_slack::verify::SignatureHeaders;
use serde_json::json;

use support::{
    form_request, harness, harness_with, json_request, mention_event, to_body, HarnessOptions,
    RecordingSlack, ScriptedIds, UnavailableStore, CALLER, CHANNEL, REPLY_TS, SHORT_BASE, TOKEN,
};

struct Panicking;

#[async_trait]
impl CommandHandler for Panicking {
    fn name(&self) -> &'static str {
        "boom"
    }

    fn help(&self) -> CommandHelp {
        CommandHelp { name: "boom", description: "Panics", synopsis: "@hitter boom", options: &[], examples: &[] }
    }

    async fn handle(
        &self,
        _request: &CommandRequest,
        _context: &CommandContext,
    ) -> Result<CommandReply, CommandError> {
        panic!("handler exploded");
    }
}

struct Sleepy;

#[async_trait]
impl CommandHandler for Sleepy {
    fn name(&self) -> &'static str {
        "sleepy"
    }

    fn help(&self) -> CommandHelp {
        CommandHelp { name: "sleepy", description: "Never finishes", synopsis: "@hitter sleepy", options: &[], examples: &[] }
    }

    async fn handle(
        &self,
        _request: &CommandRequest,
        _context: &CommandContext,
    ) -> Result<CommandReply, CommandError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Err(CommandError::user("unreachable"))
    }
}

#[tokio::test]
async fn url_verification_echoes_challenge() {
    let harness = harness();
    let body = to_body(&json!({ "token": TOKEN, "challenge": "3eZbrw1aB", "type": "url_verification" }));

    let response = harness.processor.process(json_request(&body)).await;

    assert_eq!(response.status, 200);
    assert_eq!(response.body, json!({ "challenge": "3eZbrw1aB" }));
    assert_eq!(response.stage, ProcessingStage::Verified);
}

#[tokio::test]
async fn invalid_token_is_rejected_regardless_of_payload() {
    let harness = harness();
    let mut mention = mention_event("evt-forged", "hit 1");
    mention["token"] = json!("forged");
    let bodies = vec![
        to_body(&json!({ "token": "forged", "challenge": "c", "type": "url_verification" })),
        to_body(&mention),
        to_body(&json!({ "type": "event_callback", "event_id": "evt-none", "event": { "type": "app_mention" } })),
        to_body(&json!({ "type": "event_callback", "token": "forged" })),
        to_body(&json!({ "token": "forged" })),
        to_body(&json!({ "type": "app_rate_limited", "token": 42 })),
    ];

    for body in &bodies {
        let response = harness.processor.process(json_request(body)).await;
        assert_eq!(response.status, 401, "{}", String::from_utf8_lossy(body));
        assert_eq!(response.stage, ProcessingStage::Rejected);
    }
    let slash_bodies: [&[u8]; 2] = [
        b"token=forged&channel_id=C1&user_id=U1&command=%2Fhitter&text=help&trigger_id=t1",
        b"token=forged&channel_id=C1&command=%2Fhitter&text=help",
    ];
    for body in slash_bodies {
        let response = harness.processor.process(form_request(body)).await;
        assert_eq!(response.status, 401);
        assert_eq!(response.stage, ProcessingStage::Rejected);
    }

    assert!(harness.slack.posted().is_empty());
    assert!(harness.mutex_store.get("evt-forged").await.expect("lookup").is_none());
}

#[tokio::test]
async fn rejection_carries_the_delivery_id() {
    let harness = harness();
    let mut mention = mention_event("evt-forged", "hit 1");
    mention["token"] = json!("forged");

    let response = harness.processor.process(json_request(&to_body(&mention))).await;

    assert_eq!(response.status, 401);
    assert_eq!(response.body["correlation_id"], "evt-forged");
}

#[tokio::test]
async fn unknown_envelope_with_valid_token_is_ignored() {
    let harness = harness();
    let body = to_body(&json!({ "type": "app_rate_limited", "token": TOKEN, "team_id": "T1" }));

    let response = harness.processor.process(json_request(&body)).await;

    assert_eq!(response.status, 200);
    assert_eq!(response.stage, ProcessingStage::Verified);
    assert!(response.body["message"].as_str().is_some_and(|text| text.starts_with("[IGNORED]")));
    assert!(harness.slack.posted().is_empty());
}

#[tokio::test]
async fn verified_but_incomplete_slash_command_is_a_bad_request() {
    let harness = harness();
    let body = format!("token={TOKEN}&channel_id=C1&command=%2Fhitter&text=help");

    let response = harness.processor.process(form_request(body.as_bytes())).await;

    assert_eq!(response.status, 400);
    assert_eq!(response.stage, ProcessingStage::Received);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn simultaneous_deliveries_run_the_command_once() {
    let harness = Arc::new(harness());
    let body = Arc::new(to_body(&mention_event("evt-42", "hit 1")));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let harness = Arc::clone(&harness);
            let body = Arc::clone(&body);
            tokio::spawn(async move { harness.processor.process(json_request(&body)).await })
        })
        .collect();
    let mut stages = Vec::new();
    for task in tasks {
        stages.push(task.await.expect("delivery task").stage);
    }

    let responded = stages.iter().filter(|stage| **stage == ProcessingStage::Responded).count();
    let acknowledged = stages.iter().filter(|stage| **stage == ProcessingStage::Acknowledged).count();
    assert_eq!(responded, 1);
    assert_eq!(acknowledged, 7);
    assert_eq!(harness.slack.posted().len(), 1);
}

#[tokio::test]
async fn malformed_body_is_a_bad_request() {
    let harness = harness();
    let response = harness.processor.process(json_request(b"{\"type\": ")).await;

    assert_eq!(response.status, 400);
    assert_eq!(response.stage, ProcessingStage::Received);
}

#[tokio::test]
async fn replayed_delivery_is_acknowledged_without_side_effects() {
    let harness = harness();
    let body = to_body(&mention_event("evt-42", "hit 1"));

    let first = harness.processor.process(json_request(&body)).await;
    let second = harness.processor.process(json_request(&body)).await;

    assert_eq!(first.status, 200);
    assert_eq!(first.body, json!({ "result": "ok" }));
    assert_eq!(first.stage, ProcessingStage::Responded);
    assert_eq!(second.status, 200);
    assert_eq!(second.stage, ProcessingStage::Acknowledged);
    assert_eq!(harness.slack.posted().len(), 1);
    assert_eq!(harness.slack.member_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn claim_expires_after_the_hold_window() {
    let harness = harness();
    let body = to_body(&mention_event("evt-7", "help"));

    harness.processor.process(json_request(&body)).await;
    harness.clock.advance(Duration::from_secs(24 * 60 * 60 + 1));
    let again = harness.processor.process(json_request(&body)).await;

    assert_eq!(again.stage, ProcessingStage::Responded);
    assert_eq!(harness.slack.posted().len(), 2);
}

#[tokio::test]
async fn help_lists_every_command() {
    let harness = harness();
    let body = to_body(&mention_event("evt-help", "help"));

    harness.processor.process(json_request(&body)).await;

    let text = harness.slack.last_text();
    assert!(text.contains(&format!("<@{CALLER}> :thinking_face:")));
    for command in ["hit", "translate", "link", "short"] {
        assert!(text.contains(&format!(":book: *{command}*")), "missing {command}");
    }
    assert!(!text.contains(":book: *help*"));
}

#[tokio::test]
async fn unknown_command_replies_with_flagged_help() {
    let harness = harness();
    let body = to_body(&mention_event("evt-unknown", "dance --now"));

    let response = harness.processor.process(json_request(&body)).await;

    assert_eq!(response.status, 200);
    let posted = harness.slack.posted();
    assert_eq!(posted.len(), 1);
    let rendered = serde_json::to_string(&posted[0].message).expect("serialize");
    assert!(rendered.contains("Unrecognized command `dance`"));
    assert!(rendered.contains(":book: *hit*"));
}

#[tokio::test]
async fn non_mentions_and_bot_messages_are_ignored() {
    let harness = harness();
    let mut message = mention_event("evt-msg", "hit 1");
    message["event"]["type"] = json!("message");
    let mut from_bot = mention_event("evt-bot", "hit 1");
    from_bot["event"]["bot_id"] = json!("B123");

    for body in [to_body(&message), to_body(&from_bot)] {
        let response = harness.processor.process(json_request(&body)).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.stage, ProcessingStage::Verified);
    }
    assert!(harness.slack.posted().is_empty());
    assert!(harness.mutex_store.get("evt-msg").await.expect("lookup").is_none());
}

#[tokio::test]
async fn other_channels_are_ignored_when_filtered() {
    let harness = harness_with(HarnessOptions { channel_filter: Some("C-ONLY"), ..HarnessOptions::default() });
    let body = to_body(&mention_event("evt-channel", "hit 1"));

    let response = harness.processor.process(json_request(&body)).await;

    assert_eq!(response.status, 200);
    assert_eq!(response.stage, ProcessingStage::Verified);
    assert!(harness.slack.posted().is_empty());
}

#[tokio::test]
async fn hit_picks_distinct_humans_excluding_requested_users() {
    let slack = RecordingSlack::with_members(&[CALLER, "U1", "U2", "UBOT"], &["UBOT"]);
    let harness = harness_with(HarnessOptions { slack, ..HarnessOptions::default() });
    let body = to_body(&mention_event("evt-hit", "hit 2 --ex <@U061F7AUR>"));

    harness.processor.process(json_request(&body)).await;

    let text = harness.slack.last_text();
    assert!(text.contains(":confetti_ball:"));
    assert!(text.contains("<@U1>"));
    assert!(text.contains("<@U2>"));
    assert!(text.contains("You are the *2nd* choice."));
    assert!(!text.contains("<@UBOT>"));
    assert!(!text.contains(&format!(":tada: *[1]:*  <@{CALLER}>")));
}

#[tokio::test]
async fn too_many_choices_is_reported_in_channel() {
    let harness = harness();
    let body = to_body(&mention_event("evt-many", "hit 9"));

    let response = harness.processor.process(json_request(&body)).await;

    assert_eq!(response.status, 200);
    assert_eq!(response.stage, ProcessingStage::Responded);
    let text = harness.slack.last_text();
    assert!(text.contains(":rotating_light:"));
    assert!(text.contains("*[There are too many choices: 9/4]*"));
}

#[tokio::test]
async fn short_link_reply_resolves_to_the_long_url() {
    let harness = harness_with(HarnessOptions {
        id_generator: Some(Arc::new(ScriptedIds::new(&["aB3dF"]))),
        ..HarnessOptions::default()
    });
    let mut event = mention_event("evt-short", "short <https://example.com/docs|example.com/docs> --ttl 7");
    event["event"]["blocks"] = json!([{
        "type": "rich_text",
        "elements": [{ "type": "rich_text_section", "elements": [
            { "type": "user", "user_id": "U0LAN0Z89" },
            { "type": "text", "text": " short " },
            { "type": "link", "url": "https://example.com/docs" },
            { "type": "text", "text": " --ttl 7" }
        ]}]
    }]);

    harness.processor.process(json_request(&to_body(&event))).await;

    assert!(harness.slack.last_text().contains(&format!(":link: {SHORT_BASE}/aB3dF")));
    match harness.short_urls.resolve("aB3dF").await.expect("resolve") {
        Resolution::Found(record) => {
            assert_eq!(record.long_url, "https://example.com/docs");
            assert_eq!((record.expires_at - support::start()).num_days(), 7);
        }
        Resolution::NotFound => panic!("short link should resolve"),
    }
}

#[tokio::test]
async fn exhausted_short_ids_post_error_then_fail_internally() {
    let url_store: Arc<dyn ExpiringStore> = Arc::new(InMemoryExpiringStore::new("hitter-url"));
    let far_future = chrono::Utc::now() + chrono::Duration::days(365);
    assert_eq!(
        url_store.put_if_absent("taken", "https://first.example.com", far_future).await.expect("seed"),
        PutOutcome::Created
    );
    let harness = harness_with(HarnessOptions {
        url_store: Some(url_store),
        id_generator: Some(Arc::new(ScriptedIds::new(&["taken"]))),
        ..HarnessOptions::default()
    });
    let body = to_body(&mention_event("evt-collide", "short https://second.example.com"));

    let response = harness.processor.process(json_request(&body)).await;

    assert_eq!(response.status, 500);
    assert_eq!(response.stage, ProcessingStage::Responded);
    assert!(harness.slack.last_text().contains("Could not allocate a short id"));
}

#[tokio::test]
async fn translation_result_is_attached_to_the_reply_thread() {
    let harness = harness();
    let body = to_body(&mention_event("evt-translate", "translate Good morning, team"));

    harness.processor.process(json_request(&body)).await;

    assert!(harness.slack.last_text().contains("Translated the text from *[en]* to *[ja]*"));
    let uploads = harness.slack.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].channel, CHANNEL);
    assert_eq!(uploads[0].thread_ts.as_deref(), Some(REPLY_TS));
    assert!(uploads[0].file.file_name.ends_with("_translate_command_result.text"));
    assert!(uploads[0].file.content.contains("[en->ja] Good morning, team"));
}

#[tokio::test]
async fn link_stages_attachments_behind_signed_urls() {
    let slack = RecordingSlack::with_members(&[CALLER], &[]);
    slack.files.lock().expect("files").insert("https://files.slack.com/F1".to_owned(), b"quarterly numbers".to_vec());
    let harness = harness_with(HarnessOptions { slack, ..HarnessOptions::default() });
    let mut event = mention_event("evt-link", "link 30");
    event["event"]["files"] = json!([{
        "id": "F1",
        "name": "report.txt",
        "mimetype": "text/plain",
        "url_private_download": "https://files.slack.com/F1"
    }]);

    harness.processor.process(json_request(&to_body(&event))).await;

    assert!(harness.slack.last_text().contains(":linked_paperclips: Object information"));
    let uploads = harness.slack.uploads();
    assert_eq!(uploads.len(), 1);
    let listing = &uploads[0].file.content;
    assert!(listing.contains("hitter-objects"));
    assert!(listing.contains("https://api.example.com/objects/"));
    assert!(listing.contains("&signature="));
}

#[tokio::test]
async fn link_without_files_is_a_user_error() {
    let harness = harness();
    let body = to_body(&mention_event("evt-link-empty", "link"));

    let response = harness.processor.process(json_request(&body)).await;

    assert_eq!(response.status, 200);
    assert!(harness.slack.last_text().contains("Attach at least one file"));
}

#[tokio::test]
async fn unreachable_slack_is_a_bad_gateway() {
    let harness = harness();
    harness.slack.unreachable.store(true, Ordering::SeqCst);
    let body = to_body(&mention_event("evt-down", "help"));

    let response = harness.processor.process(json_request(&body)).await;

    assert_eq!(response.status, 502);
    assert_eq!(response.stage, ProcessingStage::Dispatched);
}

#[tokio::test]
async fn unavailable_mutex_store_is_service_unavailable() {
    let harness = harness_with(HarnessOptions {
        mutex_store: Some(Arc::new(UnavailableStore)),
        ..HarnessOptions::default()
    });
    let body = to_body(&mention_event("evt-db", "help"));

    let response = harness.processor.process(json_request(&body)).await;

    assert_eq!(response.status, 503);
    assert_eq!(response.body["correlation_id"], "evt-db");
    assert!(harness.slack.posted().is_empty());
}

#[tokio::test]
async fn panicking_handler_becomes_a_chat_error() {
    let harness = harness_with(HarnessOptions {
        extra_handlers: vec![Arc::new(Panicking)],
        ..HarnessOptions::default()
    });
    let body = to_body(&mention_event("evt-panic", "boom"));

    let response = harness.processor.process(json_request(&body)).await;

    assert_eq!(response.status, 200);
    assert!(harness.slack.last_text().contains("The command stopped unexpectedly"));
}

#[tokio::test]
async fn slow_handler_is_cut_off_by_the_timeout() {
    let harness = harness_with(HarnessOptions {
        handler_timeout: Duration::from_millis(50),
        extra_handlers: vec![Arc::new(Sleepy)],
        ..HarnessOptions::default()
    });
    let body = to_body(&mention_event("evt-slow", "sleepy"));

    let response = harness.processor.process(json_request(&body)).await;

    assert_eq!(response.status, 200);
    assert!(harness.slack.last_text().contains("did not finish"));
}

#[tokio::test]
async fn signed_requests_require_a_matching_signature() {
    let secret = "8f742231b10e8888abcd99yyyzzz85a5";
    let harness = harness_with(HarnessOptions { signing_secret: Some(secret), ..HarnessOptions::default() });
    let body = to_body(&mention_event("evt-signed", "help"));
    let timestamp = support::start().timestamp().to_string();

    let unsigned = harness.processor.process(json_request(&body)).await;
    assert_eq!(unsigned.status, 401);

    let mut base = format!("v0:{timestamp}:").into_bytes();
    base.extend_from_slice(&body);
    let signature = format!("v0={}", hmac_sha256_hex(secret.as_bytes(), &base));
    let signed = harness
        .processor
        .process(WebhookRequest {
            content_type: Some("application/json"),
            signature: SignatureHeaders { timestamp: Some(&timestamp), signature: Some(&signature) },
            body: &body,
        })
        .await;

    assert_eq!(signed.status, 200);
    assert_eq!(signed.stage, ProcessingStage::Responded);
}

#[tokio::test]
async fn slash_command_reply_is_returned_in_channel() {
    let harness = harness();
    let body = format!(
        "token={TOKEN}&team_id=T1&channel_id={CHANNEL}&user_id={CALLER}&command=%2Fhitter&text=hit+1&trigger_id=trig-1"
    );

    let first = harness.processor.process(form_request(body.as_bytes())).await;
    let replay = harness.processor.process(form_request(body.as_bytes())).await;

    assert_eq!(first.status, 200);
    assert_eq!(first.body["response_type"], "in_channel");
    assert_eq!(first.body["blocks"][0]["type"], "section");
    assert_eq!(replay.stage, ProcessingStage::Acknowledged);
    assert!(harness.slack.posted().is_empty());
}
