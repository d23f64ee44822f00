use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::audit::MemoryAuditLog;
use crate::ops::{OpsError, SubscriptionAgent, UnsubscribeOutcome};

use super::{classify, DispatchOptions, EventAction, FeedbackDispatcher, FeedbackEvent, FeedbackKind};

#[derive(Default)]
struct RecordingAgent {
    calls: Mutex<Vec<(&'static str, String)>>,
    fail_for: Option<String>,
}

impl RecordingAgent {
    fn failing_for(recipient: &str) -> Self {
        Self {
            fail_for: Some(recipient.to_string()),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<(&'static str, String)> {
        self.calls.lock().expect("calls poisoned").clone()
    }

    fn record(&self, method: &'static str, email: &str) -> Result<(), OpsError> {
        self.calls
            .lock()
            .expect("calls poisoned")
            .push((method, email.to_string()));
        if self.fail_for.as_deref() == Some(email) {
            return Err(OpsError::new("d'oh!"));
        }
        Ok(())
    }
}

#[async_trait]
impl SubscriptionAgent for RecordingAgent {
    async fn remove(&self, email: &str) -> Result<(), OpsError> {
        self.record("Remove", email)
    }

    async fn restore(&self, email: &str) -> Result<(), OpsError> {
        self.record("Restore", email)
    }

    async fn unsubscribe(
        &self,
        email: &str,
        _token: &str,
    ) -> Result<UnsubscribeOutcome, OpsError> {
        self.record("Unsubscribe", email)?;
        Ok(UnsubscribeOutcome::Unsubscribed)
    }
}

struct Fixture {
    agent: Arc<RecordingAgent>,
    log: Arc<MemoryAuditLog>,
    dispatcher: FeedbackDispatcher,
}

fn fixture() -> Fixture {
    fixture_with_agent(RecordingAgent::default())
}

fn fixture_with_agent(agent: RecordingAgent) -> Fixture {
    let agent = Arc::new(agent);
    let log = Arc::new(MemoryAuditLog::new());
    let dispatcher = FeedbackDispatcher::new(agent.clone(), log.clone());
    Fixture {
        agent,
        log,
        dispatcher,
    }
}

// Adapted from the provider's published notification examples.
fn event_json(event_type: &str, detail: &str) -> String {
    format!(
        concat!(
            r#"{{"eventType":"{}","#,
            r#""mail":{{"messageId":"deadbeef","commonHeaders":{{"#,
            r#""from":["no-reply@mike-bland.com"],"to":["mbland@acm.org"],"#,
            r#""subject":"Latest blog post"}}}}{}}}"#
        ),
        event_type, detail
    )
}

fn bounce_json(bounce_type: &str, sub_type: &str) -> String {
    event_json(
        "Bounce",
        &format!(r#","bounce":{{"bounceType":"{bounce_type}","bounceSubType":"{sub_type}"}}"#),
    )
}

fn complaint_json(sub_type: &str, feedback_type: &str) -> String {
    event_json(
        "Complaint",
        &format!(
            r#","complaint":{{"complaintSubType":"{sub_type}","complaintFeedbackType":"{feedback_type}"}}"#
        ),
    )
}

#[test]
fn parses_send_event_common_fields() {
    let raw = event_json("Send", r#","send":{}"#);

    let feedback = FeedbackEvent::parse(&raw).expect("parse");

    assert_eq!(feedback.kind, FeedbackKind::Send);
    assert_eq!(feedback.message_id, "deadbeef");
    assert_eq!(feedback.from, vec!["no-reply@mike-bland.com"]);
    assert_eq!(feedback.to, vec!["mbland@acm.org"]);
    assert_eq!(feedback.subject, "Latest blog post");
    assert_eq!(feedback.raw, raw);
}

#[test]
fn parses_unknown_event_type_as_unrecognized() {
    let raw = event_json("Open", r#","open":{"ipAddress":"127.0.0.1"}"#);

    let feedback = FeedbackEvent::parse(&raw).expect("parse");

    assert_eq!(
        feedback.kind,
        FeedbackKind::Unrecognized {
            type_name: "Open".to_string()
        }
    );
}

#[test]
fn parses_bounce_fields() {
    let feedback = FeedbackEvent::parse(&bounce_json("Permanent", "General")).expect("parse");

    assert_eq!(
        feedback.kind,
        FeedbackKind::Bounce {
            bounce_type: "Permanent".to_string(),
            bounce_sub_type: "General".to_string(),
        }
    );
}

#[test]
fn parse_fails_on_malformed_record() {
    assert!(FeedbackEvent::parse("").is_err());
    assert!(FeedbackEvent::parse("{\"eventType\":42}").is_err());
}

#[test]
fn classify_is_a_pure_mapping_of_typed_fields() {
    let transient = FeedbackKind::Bounce {
        bounce_type: "Transient".to_string(),
        bounce_sub_type: "General".to_string(),
    };
    assert_eq!(
        classify(&transient),
        EventAction::NoOp {
            outcome: "not removing recipients: Transient/General".to_string()
        }
    );

    let undetermined = FeedbackKind::Bounce {
        bounce_type: "Undetermined".to_string(),
        bounce_sub_type: "Undetermined".to_string(),
    };
    assert_eq!(
        classify(&undetermined),
        EventAction::Remove {
            reason: "Undetermined/Undetermined".to_string()
        }
    );

    let not_spam = FeedbackKind::Complaint {
        complaint_sub_type: String::new(),
        complaint_feedback_type: "not-spam".to_string(),
    };
    assert_eq!(
        classify(&not_spam),
        EventAction::Restore {
            reason: "not-spam".to_string()
        }
    );

    let reject = FeedbackKind::Reject {
        reason: "Bad content".to_string(),
    };
    assert_eq!(
        classify(&reject),
        EventAction::NoOp {
            outcome: "Bad content".to_string()
        }
    );
}

#[tokio::test]
async fn send_event_logs_success_with_exact_format() {
    let f = fixture();
    let raw = event_json("Send", r#","send":{}"#);

    f.dispatcher.handle_record(&raw).await;

    let expected = format!(
        r#"Send [Id:"deadbeef" From:"no-reply@mike-bland.com" To:"mbland@acm.org" Subject:"Latest blog post"]: success: {raw}"#
    );
    assert_eq!(f.log.lines(), vec![expected]);
    assert!(f.agent.calls().is_empty());
}

#[tokio::test]
async fn delivery_event_is_a_no_op() {
    let f = fixture();

    f.dispatcher
        .handle_record(&event_json("Delivery", r#","delivery":{}"#))
        .await;

    assert!(f.log.contains(": success: "));
    assert!(f.agent.calls().is_empty());
}

#[tokio::test]
async fn permanent_bounce_removes_each_recipient() {
    let f = fixture();

    f.dispatcher
        .handle_record(&bounce_json("Permanent", "General"))
        .await;

    assert!(f.log.contains("removed mbland@acm.org due to: Permanent/General"));
    assert_eq!(f.agent.calls(), vec![("Remove", "mbland@acm.org".to_string())]);
}

#[tokio::test]
async fn transient_bounce_makes_no_agent_calls() {
    let f = fixture();

    f.dispatcher
        .handle_record(&bounce_json("Transient", "General"))
        .await;

    assert!(f.log.contains("not removing recipients: Transient/General"));
    assert!(f.agent.calls().is_empty());
}

#[tokio::test]
async fn complaint_with_feedback_type_removes_with_that_reason() {
    let f = fixture();

    f.dispatcher
        .handle_record(&complaint_json("", "abuse"))
        .await;

    assert!(f.log.contains("removed mbland@acm.org due to: abuse"));
    assert_eq!(f.agent.calls(), vec![("Remove", "mbland@acm.org".to_string())]);
}

#[tokio::test]
async fn complaint_sub_type_takes_precedence() {
    let f = fixture();

    f.dispatcher
        .handle_record(&complaint_json("OnAccountSuppressionList", "abuse"))
        .await;

    assert!(f.log.contains("removed mbland@acm.org due to: OnAccountSuppressionList"));
}

#[tokio::test]
async fn not_spam_complaint_restores_recipients() {
    let f = fixture();

    f.dispatcher
        .handle_record(&complaint_json("", "not-spam"))
        .await;

    assert!(f.log.contains("restored mbland@acm.org due to: not-spam"));
    assert_eq!(f.agent.calls(), vec![("Restore", "mbland@acm.org".to_string())]);
}

#[tokio::test]
async fn complaint_with_no_classification_removes_as_unknown() {
    let f = fixture();

    f.dispatcher.handle_record(&complaint_json("", "")).await;

    assert!(f.log.contains("removed mbland@acm.org due to: unknown"));
}

#[tokio::test]
async fn reject_event_logs_reason_verbatim_without_agent_calls() {
    let f = fixture();

    f.dispatcher
        .handle_record(&event_json("Reject", r#","reject":{"reason":"Bad content"}"#))
        .await;

    assert!(f.log.contains("]: Bad content: "));
    assert!(f.agent.calls().is_empty());
}

#[tokio::test]
async fn unrecognized_event_is_logged_as_unimplemented() {
    let f = fixture();

    f.dispatcher
        .handle_record(&event_json("Open", r#","open":{}"#))
        .await;

    assert!(f.log.contains("unimplemented event type: Open"));
    assert!(f.agent.calls().is_empty());
}

#[tokio::test]
async fn parse_failure_mid_batch_does_not_block_other_records() {
    let f = fixture();
    let records = vec![
        bounce_json("Permanent", "General"),
        "not json".to_string(),
        complaint_json("", "not-spam"),
    ];

    f.dispatcher.handle_batch(&records).await;

    let calls = f.agent.calls();
    assert!(calls.contains(&("Remove", "mbland@acm.org".to_string())));
    assert!(calls.contains(&("Restore", "mbland@acm.org".to_string())));
    let parse_lines = f
        .log
        .lines()
        .iter()
        .filter(|line| line.starts_with("parsing feedback event failed:"))
        .count();
    assert_eq!(parse_lines, 1);
    assert!(f.log.contains("not json"));
}

#[tokio::test]
async fn failing_recipient_does_not_block_siblings() {
    let agent = Arc::new(RecordingAgent::failing_for("first@acm.org"));
    let log = Arc::new(MemoryAuditLog::new());
    let dispatcher = FeedbackDispatcher::new(agent.clone(), log.clone()).with_options(
        DispatchOptions {
            max_concurrent_updates: 1,
            ..DispatchOptions::default()
        },
    );
    let raw = format!(
        concat!(
            r#"{{"eventType":"Bounce","#,
            r#""mail":{{"messageId":"deadbeef","commonHeaders":{{"#,
            r#""from":["no-reply@mike-bland.com"],"#,
            r#""to":["first@acm.org","second@acm.org"],"subject":"s"}}}},"#,
            r#""bounce":{{"bounceType":"Permanent","bounceSubType":"General"}}}}"#
        )
    );

    dispatcher.handle_record(&raw).await;

    assert!(log.contains("error removing first@acm.org due to: Permanent/General: d'oh!"));
    assert!(log.contains("removed second@acm.org due to: Permanent/General"));
    assert_eq!(agent.calls().len(), 2);
}

#[tokio::test]
async fn bounce_without_detail_object_still_classifies() {
    let f = fixture();

    f.dispatcher.handle_record(&event_json("Bounce", "")).await;

    // Missing detail fields read as empty strings, which is not Transient,
    // so the recipients are removed.
    assert!(f.log.contains("removed mbland@acm.org due to: /"));
}
