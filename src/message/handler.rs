use axum::http::StatusCode;

impl From<super::Error> for StatusCode {
    fn from(e: super::Error) -> Self {
        match e {
            super::Error::NotFound(_) => Self::NOT_FOUND,
            super::Error::NotOwner | super::Error::Blocked(_) => Self::FORBIDDEN,
            super::Error::Empty
            | super::Error::MissingMedia(_)
            | super::Error::UnsupportedKind(_) => Self::BAD_REQUEST,
            super::Error::_Conversation(e) => Self::from(e),
            super::Error::_Contact(e) => Self::from(e),
            super::Error::_User(_) | super::Error::_R2d2(_) | super::Error::_Diesel(_) => {
                Self::INTERNAL_SERVER_ERROR
            }
        }
    }
}

pub(super) mod api {
    use axum::extract::{FromRequest, Multipart, Path, Request, State};
    use axum::http::{StatusCode, header};
    use axum::{Extension, Json};

    use crate::message::model::{Draft, History, MessageDto};
    use crate::{auth, conversation, media, message};

    pub async fn find_all(
        Extension(auth_user): Extension<auth::User>,
        State(message_service): State<message::Service>,
        Path(id): Path<conversation::Id>,
    ) -> crate::Result<Json<History>> {
        let history = message_service.fetch(&id, auth_user.id()).await?;
        Ok(Json(history))
    }

    /// Accepts either a JSON draft or a multipart body carrying a `file`
    /// part next to optional `content` and `type` parts.
    pub async fn create(
        Extension(auth_user): Extension<auth::User>,
        State(message_service): State<message::Service>,
        State(media_store): State<media::Store>,
        Path(id): Path<conversation::Id>,
        req: Request,
    ) -> crate::Result<Json<MessageDto>> {
        let draft = if is_multipart(&req) {
            let multipart = Multipart::from_request(req, &()).await?;
            read_draft(multipart, &media_store).await?
        } else {
            let Json(draft) = Json::<Draft>::from_request(req, &()).await?;
            draft
        };

        let message = message_service.send(&id, auth_user.id(), draft).await?;
        Ok(Json(message))
    }

    pub async fn delete(
        Extension(auth_user): Extension<auth::User>,
        State(message_service): State<message::Service>,
        Path((id, message_id)): Path<(conversation::Id, message::Id)>,
    ) -> crate::Result<StatusCode> {
        message_service
            .delete(&id, &message_id, auth_user.id())
            .await?;
        Ok(StatusCode::NO_CONTENT)
    }

    fn is_multipart(req: &Request) -> bool {
        req.headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("multipart/form-data"))
    }

    async fn read_draft(multipart: Multipart, media_store: &media::Store) -> crate::Result<Draft> {
        let mut form = media::form::Form::read(multipart).await?;

        let upload = form.take_upload();
        let kind = match form.field("type") {
            Some(k) if !k.is_empty() => Some(k.parse::<message::Kind>()?),
            _ => upload.as_ref().map(media::Upload::kind),
        };
        let media_ref = match &upload {
            Some(u) => Some(media_store.store(u).await?),
            None => None,
        };

        Ok(Draft {
            content: form.field("content").map(str::to_owned),
            kind,
            media_ref,
        })
    }
}
