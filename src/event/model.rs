use serde::{Deserialize, Serialize};

use crate::call::{
    CallKind, CallerInfo, EndReason, FailReason, IceCandidate, SessionDescription,
};
use crate::message::model::MessageDto;
use crate::{conversation, message, user};

/// Server to client frame: `{ "event": "newMessage", "data": { ... } }`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Event {
    NewMessage {
        recipient_id: user::Id,
        conversation_id: conversation::Id,
        message: MessageDto,
    },
    NewConversation {
        recipient_id: user::Id,
        conversation_id: conversation::Id,
    },
    RemovedFromGroup {
        conversation_id: conversation::Id,
    },
    MessageDeleted {
        conversation_id: conversation::Id,
        message_id: message::Id,
    },
    OnlineUsers {
        users: Vec<user::Id>,
    },

    IncomingCall {
        conversation_id: conversation::Id,
        from: user::Id,
        offer: SessionDescription,
        call_type: CallKind,
        caller: CallerInfo,
        /// Whoever placed the call, which may differ from `from` in a group call.
        initiator: user::Id,
        participants: Vec<user::Id>,
    },
    CallAccepted {
        conversation_id: conversation::Id,
        from: user::Id,
        answer: SessionDescription,
    },
    IceCandidate {
        conversation_id: conversation::Id,
        from: user::Id,
        candidate: IceCandidate,
    },
    CallEnded {
        conversation_id: conversation::Id,
        /// Absent when the server ended the call.
        from: Option<user::Id>,
        reason: EndReason,
    },
    CallDeclined {
        conversation_id: conversation::Id,
        from: user::Id,
    },
    CallFailed {
        conversation_id: conversation::Id,
        reason: FailReason,
    },
}

/// Client to server frame, same envelope as [`Event`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Command {
    Register,
    GetOnlineUsers,

    CallUser {
        conversation_id: conversation::Id,
        to: user::Id,
        offer: SessionDescription,
        call_type: CallKind,
        caller: CallerInfo,
        participants: Vec<user::Id>,
    },
    AnswerCall {
        conversation_id: conversation::Id,
        to: user::Id,
        answer: SessionDescription,
    },
    IceCandidate {
        conversation_id: conversation::Id,
        to: user::Id,
        candidate: IceCandidate,
    },
    EndCall {
        conversation_id: conversation::Id,
    },
    DeclineCall {
        conversation_id: conversation::Id,
    },
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn should_parse_call_user_frame() {
        let conversation_id = conversation::Id::random();
        let (me, to) = (user::Id::random(), user::Id::random());
        let frame = json!({
            "event": "callUser",
            "data": {
                "conversationId": conversation_id,
                "to": to,
                "offer": { "type": "offer", "sdp": "v=0" },
                "callType": "video",
                "caller": { "id": me, "name": "Amélie Roux", "avatar": null },
                "participants": [me, to]
            }
        });

        let command = serde_json::from_value::<Command>(frame).unwrap();

        assert_eq!(
            command,
            Command::CallUser {
                conversation_id,
                to,
                offer: SessionDescription::offer("v=0"),
                call_type: CallKind::Video,
                caller: CallerInfo {
                    id: me,
                    name: "Amélie Roux".into(),
                    avatar: None
                },
                participants: vec![me, to],
            }
        );
    }

    #[test]
    fn should_parse_frames_without_data() {
        let register = serde_json::from_str::<Command>(r#"{"event":"register"}"#).unwrap();
        let online = serde_json::from_str::<Command>(r#"{"event":"getOnlineUsers"}"#).unwrap();

        assert_eq!(register, Command::Register);
        assert_eq!(online, Command::GetOnlineUsers);
    }

    #[test]
    fn should_render_event_envelope() {
        let conversation_id = conversation::Id::random();
        let event = Event::CallEnded {
            conversation_id,
            from: None,
            reason: EndReason::Timeout,
        };

        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "event": "callEnded",
                "data": {
                    "conversationId": conversation_id,
                    "from": null,
                    "reason": "timeout"
                }
            })
        );
    }

    #[test]
    fn should_reject_unknown_command() {
        assert!(serde_json::from_str::<Command>(r#"{"event":"selfDestruct"}"#).is_err());
    }
}
