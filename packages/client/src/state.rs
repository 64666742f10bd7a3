//! Client state that survives reconnects.
//!
//! Holds the joined rooms, the current room and the sequence tracker. The
//! session feeds it commands and server frames; it answers with frames to
//! send and text to print.

use std::collections::BTreeSet;

use hiroba_shared::protocol::{ClientFrame, ServerFrame};
use serde_json::json;

use crate::{
    command::{Command, HELP},
    formatter::MessageFormatter,
    tracker::SequenceTracker,
};

/// Messages requested per history page. A full page means there may be
/// more, and the next page is requested from its last sequence.
pub const HISTORY_PAGE: usize = 100;

/// What the session should do with a typed command or a server frame
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Send(ClientFrame),
    Print(String),
    Quit,
}

#[derive(Debug, Default)]
pub struct ClientState {
    user: Option<String>,
    rooms: BTreeSet<String>,
    current: Option<String>,
    tracker: SequenceTracker,
    connected: bool,
}

impl ClientState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a session reached the server since the last call
    pub fn take_connected(&mut self) -> bool {
        std::mem::take(&mut self.connected)
    }

    pub fn current_room(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn rooms(&self) -> impl Iterator<Item = &str> {
        self.rooms.iter().map(String::as_str)
    }

    /// Frames that restore membership after a reconnect and fetch what was
    /// missed while away
    pub fn resume_frames(&self) -> Vec<ClientFrame> {
        self.rooms
            .iter()
            .flat_map(|room| {
                [
                    ClientFrame::Join { room: room.clone() },
                    ClientFrame::History {
                        room: room.clone(),
                        since: self.tracker.last_seen(room),
                        limit: Some(HISTORY_PAGE),
                    },
                ]
            })
            .collect()
    }

    pub fn apply(&mut self, command: Command) -> Action {
        match command {
            Command::Join(room) => Action::Send(ClientFrame::Join { room }),
            Command::Leave(room) => Action::Send(ClientFrame::Leave { room }),
            Command::Switch(room) => {
                if self.rooms.contains(&room) {
                    let notice = format!("current room is now #{}", room);
                    self.current = Some(room);
                    Action::Print(MessageFormatter::format_notice(&notice))
                } else {
                    Action::Print(MessageFormatter::format_notice(&format!(
                        "not in #{} (use /join {})",
                        room, room
                    )))
                }
            }
            Command::Rooms => {
                let listing = self
                    .rooms
                    .iter()
                    .map(|room| {
                        let marker = if Some(room) == self.current.as_ref() {
                            " *"
                        } else {
                            ""
                        };
                        format!("#{}{}", room, marker)
                    })
                    .collect::<Vec<_>>();
                let text = if listing.is_empty() {
                    "(No rooms joined)".to_string()
                } else {
                    listing.join("\n")
                };
                Action::Print(MessageFormatter::format_notice(&text))
            }
            Command::History { room, since } => Action::Send(ClientFrame::History {
                room,
                since,
                limit: Some(HISTORY_PAGE),
            }),
            Command::Members(room) => Action::Send(ClientFrame::Members { room }),
            Command::Presence(room) => Action::Send(ClientFrame::Presence { room }),
            Command::Help => Action::Print(MessageFormatter::format_notice(HELP)),
            Command::Quit => Action::Quit,
            Command::Say(text) => match &self.current {
                Some(room) => Action::Send(ClientFrame::Publish {
                    room: room.clone(),
                    payload: json!({ "text": text }),
                }),
                None => Action::Print(MessageFormatter::format_notice(
                    "join a room first (/join <room>)",
                )),
            },
        }
    }

    /// Update state from a server frame
    pub fn handle(&mut self, frame: ServerFrame) -> Vec<Action> {
        let print = |text: String| vec![Action::Print(text)];
        match frame {
            ServerFrame::Connected {
                connection_id,
                user_id,
            } => {
                let text = MessageFormatter::format_connected(&user_id, &connection_id);
                self.user = Some(user_id);
                self.connected = true;
                print(text)
            }
            ServerFrame::Joined {
                room,
                sequence_at_join,
            } => {
                self.tracker.start_at(&room, sequence_at_join);
                let first_time = self.rooms.insert(room.clone());
                if first_time || self.current.is_none() {
                    self.current = Some(room.clone());
                }
                if first_time {
                    print(MessageFormatter::format_joined(&room, sequence_at_join))
                } else {
                    Vec::new()
                }
            }
            ServerFrame::Left { room } => {
                self.rooms.remove(&room);
                self.tracker.forget(&room);
                if self.current.as_deref() == Some(room.as_str()) {
                    self.current = self.rooms.iter().next().cloned();
                }
                print(MessageFormatter::format_left(&room))
            }
            ServerFrame::Message(message) => {
                if self.tracker.observe(&message.room, message.sequence) {
                    print(MessageFormatter::format_message(&message))
                } else {
                    Vec::new()
                }
            }
            ServerFrame::Published { room, sequence } => {
                tracing::debug!("Published to {} as {}", room, sequence);
                Vec::new()
            }
            ServerFrame::History { room, messages } => {
                let mut actions = Vec::new();
                if messages.len() >= HISTORY_PAGE
                    && let Some(last) = messages.last()
                {
                    actions.push(Action::Send(ClientFrame::History {
                        room: room.clone(),
                        since: last.sequence,
                        limit: Some(HISTORY_PAGE),
                    }));
                }

                let fresh: Vec<_> = messages
                    .into_iter()
                    .filter(|message| self.tracker.observe(&message.room, message.sequence))
                    .collect();
                if !fresh.is_empty() {
                    let mut output = MessageFormatter::format_history_header(&room, fresh.len());
                    for message in &fresh {
                        output.push_str(&MessageFormatter::format_message(message));
                    }
                    actions.insert(0, Action::Print(output));
                }
                actions
            }
            ServerFrame::Members { room, members } => print(MessageFormatter::format_members(
                &room,
                &members,
                self.user.as_deref(),
            )),
            ServerFrame::Presence { room, users } => {
                print(MessageFormatter::format_presence(&room, &users))
            }
            ServerFrame::Error { code, message } => {
                print(MessageFormatter::format_error(&code, &message))
            }
            ServerFrame::Pong => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hiroba_shared::protocol::{MessageFrame, MessageKindFrame};

    fn message(room: &str, sequence: u64) -> MessageFrame {
        MessageFrame {
            room: room.to_string(),
            sequence,
            sender: "bob".to_string(),
            kind: MessageKindFrame::Chat,
            payload: json!({ "text": format!("m{}", sequence) }),
            timestamp: 1672498800000,
        }
    }

    fn joined(state: &mut ClientState, room: &str, sequence_at_join: u64) {
        state.handle(ServerFrame::Joined {
            room: room.to_string(),
            sequence_at_join,
        });
    }

    #[test]
    fn test_say_publishes_to_current_room() {
        // テスト項目: 本文入力は現在のルームへの publish になる
        // given (前提条件):
        let mut state = ClientState::new();
        joined(&mut state, "lobby", 0);

        // when (操作):
        let action = state.apply(Command::Say("hi".to_string()));

        // then (期待する結果):
        assert_eq!(
            action,
            Action::Send(ClientFrame::Publish {
                room: "lobby".to_string(),
                payload: json!({ "text": "hi" }),
            })
        );
    }

    #[test]
    fn test_say_without_room_prints_hint() {
        // テスト項目: ルーム未参加で本文を入力すると送信せずに案内を表示する
        // given (前提条件):
        let mut state = ClientState::new();

        // when (操作):
        let action = state.apply(Command::Say("hi".to_string()));

        // then (期待する結果):
        assert!(matches!(action, Action::Print(_)));
    }

    #[test]
    fn test_resume_frames_rejoin_and_catch_up() {
        // テスト項目: 再接続時は参加中のルームに再参加し、最後に見た sequence 以降の履歴を要求する
        // given (前提条件):
        let mut state = ClientState::new();
        joined(&mut state, "lobby", 2);
        state.handle(ServerFrame::Message(message("lobby", 3)));

        // when (操作):
        let frames = state.resume_frames();

        // then (期待する結果):
        assert_eq!(
            frames,
            vec![
                ClientFrame::Join {
                    room: "lobby".to_string()
                },
                ClientFrame::History {
                    room: "lobby".to_string(),
                    since: 3,
                    limit: Some(HISTORY_PAGE),
                },
            ]
        );
    }

    #[test]
    fn test_history_after_rejoin_shows_only_missed_messages() {
        // テスト項目: 再参加後の履歴は既に表示したメッセージを除いて表示される
        // given (前提条件):
        let mut state = ClientState::new();
        joined(&mut state, "lobby", 0);
        state.handle(ServerFrame::Message(message("lobby", 1)));
        joined(&mut state, "lobby", 3);
        state.handle(ServerFrame::Message(message("lobby", 4)));

        // when (操作):
        let actions = state.handle(ServerFrame::History {
            room: "lobby".to_string(),
            messages: (1..=4).map(|sequence| message("lobby", sequence)).collect(),
        });

        // then (期待する結果):
        let [Action::Print(output)] = actions.as_slice() else {
            panic!("expected a single print action, got {:?}", actions);
        };
        assert!(output.contains("2 new message(s)"));
        assert!(output.contains("m2"));
        assert!(output.contains("m3"));
        assert!(!output.contains("m1"));
    }

    #[test]
    fn test_duplicate_live_message_is_not_printed() {
        // テスト項目: 同じ sequence のメッセージは二度表示されない
        // given (前提条件):
        let mut state = ClientState::new();
        joined(&mut state, "lobby", 0);
        state.handle(ServerFrame::Message(message("lobby", 1)));

        // when (操作):
        let actions = state.handle(ServerFrame::Message(message("lobby", 1)));

        // then (期待する結果):
        assert!(actions.is_empty());
    }

    #[test]
    fn test_leaving_current_room_switches_to_another() {
        // テスト項目: 現在のルームを抜けると残りのルームが現在のルームになる
        // given (前提条件):
        let mut state = ClientState::new();
        joined(&mut state, "kitchen", 0);
        joined(&mut state, "lobby", 0);

        // when (操作):
        state.handle(ServerFrame::Left {
            room: "lobby".to_string(),
        });

        // then (期待する結果):
        assert_eq!(state.current_room(), Some("kitchen"));
        assert_eq!(state.rooms().collect::<Vec<_>>(), vec!["kitchen"]);
        assert!(state.resume_frames().len() == 2);
    }

    #[test]
    fn test_full_history_page_requests_the_next_page() {
        // テスト項目: 履歴が 1 ページ分満杯で返ってきたら、最後の sequence から次のページを要求する
        // given (前提条件):
        let mut state = ClientState::new();
        joined(&mut state, "lobby", 0);
        let page: Vec<_> = (1..=HISTORY_PAGE as u64)
            .map(|sequence| message("lobby", sequence))
            .collect();

        // when (操作):
        let actions = state.handle(ServerFrame::History {
            room: "lobby".to_string(),
            messages: page,
        });

        // then (期待する結果):
        assert_eq!(actions.len(), 2);
        assert!(matches!(actions[0], Action::Print(_)));
        assert_eq!(
            actions[1],
            Action::Send(ClientFrame::History {
                room: "lobby".to_string(),
                since: HISTORY_PAGE as u64,
                limit: Some(HISTORY_PAGE),
            })
        );
    }

    #[test]
    fn test_short_history_page_ends_catch_up() {
        // テスト項目: 1 ページに満たない履歴では追加の要求をしない
        // given (前提条件):
        let mut state = ClientState::new();
        joined(&mut state, "lobby", 0);

        // when (操作):
        let actions = state.handle(ServerFrame::History {
            room: "lobby".to_string(),
            messages: (1..=3).map(|sequence| message("lobby", sequence)).collect(),
        });

        // then (期待する結果):
        assert!(
            actions
                .iter()
                .all(|action| !matches!(action, Action::Send(_)))
        );
        assert_eq!(state.resume_frames()[1], ClientFrame::History {
            room: "lobby".to_string(),
            since: 3,
            limit: Some(HISTORY_PAGE),
        });
    }

    #[test]
    fn test_connected_flag_is_taken_once() {
        // テスト項目: connected フレームを受け取ると接続済みフラグが立ち、一度取り出すと戻る
        // given (前提条件):
        let mut state = ClientState::new();

        // when (操作):
        state.handle(ServerFrame::Connected {
            connection_id: "c1".to_string(),
            user_id: "alice".to_string(),
        });

        // then (期待する結果):
        assert!(state.take_connected());
        assert!(!state.take_connected());
    }
}
