//! Delivery-feedback notification wire schema and the typed event it decodes
//! into. Field names are bit-exact with the provider's envelope; an unknown
//! `eventType` parses into [`FeedbackKind::Unrecognized`] rather than
//! failing.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventRecord {
    event_type: String,
    #[serde(default)]
    mail: MailObject,
    bounce: Option<BounceRecord>,
    complaint: Option<ComplaintRecord>,
    reject: Option<RejectRecord>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct MailObject {
    pub message_id: String,
    pub common_headers: CommonHeaders,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct CommonHeaders {
    pub from: Vec<String>,
    pub to: Vec<String>,
    pub subject: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct BounceRecord {
    bounce_type: String,
    bounce_sub_type: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ComplaintRecord {
    complaint_sub_type: String,
    complaint_feedback_type: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RejectRecord {
    reason: String,
}

/// One decoded delivery-feedback notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackEvent {
    pub kind: FeedbackKind,
    pub message_id: String,
    pub from: Vec<String>,
    pub to: Vec<String>,
    pub subject: String,
    /// The raw record, appended to audit lines as the details suffix.
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackKind {
    Send,
    Delivery,
    Bounce {
        bounce_type: String,
        bounce_sub_type: String,
    },
    Complaint {
        complaint_sub_type: String,
        complaint_feedback_type: String,
    },
    Reject {
        reason: String,
    },
    Unrecognized {
        type_name: String,
    },
}

impl FeedbackKind {
    pub fn type_name(&self) -> &str {
        match self {
            Self::Send => "Send",
            Self::Delivery => "Delivery",
            Self::Bounce { .. } => "Bounce",
            Self::Complaint { .. } => "Complaint",
            Self::Reject { .. } => "Reject",
            Self::Unrecognized { type_name } => type_name,
        }
    }
}

impl FeedbackEvent {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let record: EventRecord = serde_json::from_str(raw)?;

        let kind = match record.event_type.as_str() {
            "Send" => FeedbackKind::Send,
            "Delivery" => FeedbackKind::Delivery,
            "Bounce" => {
                let bounce = record.bounce.unwrap_or_default();
                FeedbackKind::Bounce {
                    bounce_type: bounce.bounce_type,
                    bounce_sub_type: bounce.bounce_sub_type,
                }
            }
            "Complaint" => {
                let complaint = record.complaint.unwrap_or_default();
                FeedbackKind::Complaint {
                    complaint_sub_type: complaint.complaint_sub_type,
                    complaint_feedback_type: complaint.complaint_feedback_type,
                }
            }
            "Reject" => FeedbackKind::Reject {
                reason: record.reject.unwrap_or_default().reason,
            },
            _ => FeedbackKind::Unrecognized {
                type_name: record.event_type,
            },
        };

        let headers = record.mail.common_headers;
        Ok(Self {
            kind,
            message_id: record.mail.message_id,
            from: headers.from,
            to: headers.to,
            subject: headers.subject,
            raw: raw.to_string(),
        })
    }
}

/// Subscriber-list action for one event. The mapping is a pure function of
/// the event's typed fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventAction {
    NoOp { outcome: String },
    Remove { reason: String },
    Restore { reason: String },
    Unimplemented { type_name: String },
}

pub fn classify(kind: &FeedbackKind) -> EventAction {
    match kind {
        FeedbackKind::Send | FeedbackKind::Delivery => EventAction::NoOp {
            outcome: "success".to_string(),
        },
        FeedbackKind::Bounce {
            bounce_type,
            bounce_sub_type,
        } => {
            let reason = format!("{bounce_type}/{bounce_sub_type}");
            if bounce_type == "Transient" {
                EventAction::NoOp {
                    outcome: format!("not removing recipients: {reason}"),
                }
            } else {
                EventAction::Remove { reason }
            }
        }
        FeedbackKind::Complaint {
            complaint_sub_type,
            complaint_feedback_type,
        } => {
            let reason = if !complaint_sub_type.is_empty() {
                complaint_sub_type.as_str()
            } else if !complaint_feedback_type.is_empty() {
                complaint_feedback_type.as_str()
            } else {
                "unknown"
            };
            if reason == "not-spam" {
                EventAction::Restore {
                    reason: reason.to_string(),
                }
            } else {
                EventAction::Remove {
                    reason: reason.to_string(),
                }
            }
        }
        FeedbackKind::Reject { reason } => EventAction::NoOp {
            outcome: reason.clone(),
        },
        FeedbackKind::Unrecognized { type_name } => EventAction::Unimplemented {
            type_name: type_name.clone(),
        },
    }
}
