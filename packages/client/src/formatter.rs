//! Message formatting utilities for client display.

use hiroba_shared::{
    protocol::{MemberFrame, MessageFrame, MessageKindFrame, PresenceFrame},
    time::timestamp_to_jst_rfc3339,
};
use serde_json::Value;

const RULE: &str = "============================================================";

/// Message formatter for client display
pub struct MessageFormatter;

impl MessageFormatter {
    pub fn format_connected(user_id: &str, connection_id: &str) -> String {
        format!(
            "\nYou are '{}' (connection {}). Type /help for commands. Press Ctrl+C to exit.\n",
            user_id, connection_id
        )
    }

    pub fn format_joined(room: &str, sequence_at_join: u64) -> String {
        format!("\n>> joined #{} at sequence {}\n", room, sequence_at_join)
    }

    pub fn format_left(room: &str) -> String {
        format!("\n<< left #{}\n", room)
    }

    /// Format a room message
    ///
    /// Chat payloads carrying a `text` field are shown as that text; other
    /// payloads are shown as JSON. Presence messages render as a one-line
    /// notice.
    pub fn format_message(message: &MessageFrame) -> String {
        let timestamp_str = timestamp_to_jst_rfc3339(message.timestamp);
        match message.kind {
            MessageKindFrame::Chat => format!(
                "\n[#{} {}] @{}: {}\n  sent at {}\n",
                message.room,
                message.sequence,
                message.sender,
                payload_text(&message.payload),
                timestamp_str
            ),
            MessageKindFrame::Presence => {
                let user = message.payload["user"].as_str().unwrap_or(&message.sender);
                let sign = if message.payload["state"] == "online" {
                    '+'
                } else {
                    '-'
                };
                format!(
                    "\n{} {} is {} in #{} ({})\n",
                    sign,
                    user,
                    message.payload["state"].as_str().unwrap_or("unknown"),
                    message.room,
                    timestamp_str
                )
            }
        }
    }

    pub fn format_history_header(room: &str, count: usize) -> String {
        format!("\n{}\nHistory of #{}: {} new message(s)\n{}", RULE, room, count, RULE)
    }

    /// Format a member listing, marking the current user
    pub fn format_members(room: &str, members: &[MemberFrame], me: Option<&str>) -> String {
        let mut output = String::new();
        output.push_str(&format!("\n{}\nMembers of #{}:\n", RULE, room));

        if members.is_empty() {
            output.push_str("(No members)\n");
        } else {
            for member in members {
                let me_suffix = if Some(member.user_id.as_str()) == me {
                    " (me)"
                } else {
                    ""
                };
                output.push_str(&format!(
                    "{}{} - connection {}\n",
                    member.user_id, me_suffix, member.connection_id
                ));
            }
        }

        output.push_str(RULE);
        output.push('\n');
        output
    }

    pub fn format_presence(room: &str, users: &[PresenceFrame]) -> String {
        let mut output = String::new();
        output.push_str(&format!("\n{}\nPresence in #{}:\n", RULE, room));

        if users.is_empty() {
            output.push_str("(Nobody has been here)\n");
        }
        for user in users {
            let state = if user.online { "online" } else { "offline" };
            output.push_str(&format!(
                "{} - {} since {}\n",
                user.user_id,
                state,
                timestamp_to_jst_rfc3339(user.changed_at)
            ));
        }

        output.push_str(RULE);
        output.push('\n');
        output
    }

    pub fn format_error(code: &str, message: &str) -> String {
        format!("\n! {}: {}\n", code, message)
    }

    pub fn format_notice(text: &str) -> String {
        format!("\n{}\n", text)
    }

    /// Format a binary message notification
    pub fn format_binary_message(byte_count: usize) -> String {
        format!("\n← Received {} bytes of binary data\n", byte_count)
    }

    /// Format a raw text message (when parsing fails)
    pub fn format_raw_message(text: &str) -> String {
        format!("\n← Received: {}\n", text)
    }
}

fn payload_text(payload: &Value) -> String {
    match payload {
        Value::String(text) => text.clone(),
        Value::Object(fields) => match fields.get("text") {
            Some(Value::String(text)) => text.clone(),
            _ => payload.to_string(),
        },
        other => other.to_string(),
    }
}
