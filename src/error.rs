use axum::Json;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::{debug, error};
use serde::Serialize;

use crate::contact::BlockStatus;
use crate::{auth, contact, conversation, media, message};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    _Auth(#[from] auth::Error),
    #[error(transparent)]
    _Contact(#[from] contact::Error),
    #[error(transparent)]
    _Conversation(#[from] conversation::Error),
    #[error(transparent)]
    _Message(#[from] message::Error),
    #[error(transparent)]
    _Media(#[from] media::Error),

    #[error(transparent)]
    _JsonRejection(#[from] JsonRejection),
    #[error(transparent)]
    _MultipartRejection(#[from] MultipartRejection),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    block_status: Option<BlockStatus>,
}

impl Error {
    /// Which side blocked the other, so that clients can tell them apart.
    fn block_status(&self) -> Option<BlockStatus> {
        match self {
            Self::_Message(message::Error::Blocked(status)) => Some(*status),
            _ => None,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let block_status = self.block_status();
        let message = self.to_string();

        let status = match self {
            Self::_Auth(e) => StatusCode::from(e),
            Self::_Contact(e) => StatusCode::from(e),
            Self::_Conversation(e) => StatusCode::from(e),
            Self::_Message(e) => StatusCode::from(e),
            Self::_Media(e) => StatusCode::from(e),
            Self::_JsonRejection(e) => e.status(),
            Self::_MultipartRejection(e) => e.status(),
        };

        let error = if status.is_server_error() {
            error!("{message}");
            "Internal server error".to_owned()
        } else {
            debug!("{status}: {message}");
            message
        };

        (status, Json(ErrorBody { error, block_status })).into_response()
    }
}

#[cfg(test)]
mod test {
    use axum::body::to_bytes;
    use serde_json::{Value, json};

    use super::*;
    use crate::user;

    async fn render(e: Error) -> (StatusCode, Value) {
        let resp = e.into_response();
        let status = resp.status();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn should_tell_which_side_blocked() {
        let (status, body) =
            render(message::Error::Blocked(BlockStatus::TheyBlocked).into()).await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["blockStatus"], json!("they_blocked"));
    }

    #[tokio::test]
    async fn should_map_domain_errors_to_statuses() {
        let (not_found, _) = render(conversation::Error::NotFound(conversation::Id::random()).into()).await;
        let (forbidden, body) = render(conversation::Error::NotMember.into()).await;
        let (invalid, _) = render(message::Error::Empty.into()).await;
        let (too_large, _) = render(media::Error::TooLarge { size: 11, max: 10 }.into()).await;
        let (unauthorized, _) = render(auth::Error::Unauthorized.into()).await;
        let (not_friends, _) = render(contact::Error::NotFriends(user::Id::random()).into()).await;

        assert_eq!(not_found, StatusCode::NOT_FOUND);
        assert_eq!(forbidden, StatusCode::FORBIDDEN);
        assert_eq!(body.get("blockStatus"), None);
        assert_eq!(invalid, StatusCode::BAD_REQUEST);
        assert_eq!(too_large, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(unauthorized, StatusCode::UNAUTHORIZED);
        assert_eq!(not_friends, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn should_hide_internal_details() {
        let io = std::io::Error::other("disk on fire");
        let (status, body) = render(media::Error::_Io(io).into()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], json!("Internal server error"));
    }
}
