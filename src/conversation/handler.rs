use axum::http::StatusCode;

impl From<super::Error> for StatusCode {
    fn from(e: super::Error) -> Self {
        match e {
            super::Error::NotFound(_) | super::Error::MemberNotFound(_) => Self::NOT_FOUND,
            super::Error::NotMember | super::Error::NotCreator => Self::FORBIDDEN,
            super::Error::AlreadyExists | super::Error::AlreadyMember(_) => Self::CONFLICT,
            super::Error::SelfReference
            | super::Error::MissingTarget
            | super::Error::NotGroup
            | super::Error::NotEnoughMembers
            | super::Error::NonExistingUser(_) => Self::BAD_REQUEST,
            super::Error::_Contact(e) => Self::from(e),
            super::Error::_Media(e) => Self::from(e),
            super::Error::_Message(e) => Self::from(*e),
            super::Error::UnsupportedKind(_)
            | super::Error::_User(_)
            | super::Error::_R2d2(_)
            | super::Error::_Diesel(_) => Self::INTERNAL_SERVER_ERROR,
        }
    }
}

pub(super) mod api {
    use axum::extract::{Multipart, Path, State};
    use axum::http::{StatusCode, header};
    use axum::response::IntoResponse;
    use axum::{Extension, Json};
    use serde::{Deserialize, Serialize};

    use crate::conversation::model::{Created, Opened, Summary};
    use crate::{auth, conversation, media, user};

    pub async fn find_all(
        Extension(auth_user): Extension<auth::User>,
        State(conversation_service): State<conversation::Service>,
    ) -> crate::Result<Json<Vec<Summary>>> {
        let summaries = conversation_service.find_all(auth_user.id()).await?;
        Ok(Json(summaries))
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct OpenPrivateParams {
        other_user_id: Option<user::Id>,
    }

    pub async fn open_private(
        Extension(auth_user): Extension<auth::User>,
        State(conversation_service): State<conversation::Service>,
        Json(params): Json<OpenPrivateParams>,
    ) -> crate::Result<Json<Opened>> {
        let opened = conversation_service
            .open_private(auth_user.id(), params.other_user_id)
            .await?;
        Ok(Json(opened))
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct CreateGroupParams {
        title: Option<String>,
        #[serde(default)]
        member_ids: Vec<user::Id>,
    }

    pub async fn create_group(
        Extension(auth_user): Extension<auth::User>,
        State(conversation_service): State<conversation::Service>,
        Json(params): Json<CreateGroupParams>,
    ) -> crate::Result<(StatusCode, Json<Created>)> {
        let created = conversation_service
            .create_group(auth_user.id(), params.title, &params.member_ids)
            .await?;
        Ok((StatusCode::CREATED, Json(created)))
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct AddMemberParams {
        user_id: user::Id,
    }

    pub async fn add_member(
        Extension(auth_user): Extension<auth::User>,
        State(conversation_service): State<conversation::Service>,
        Path(id): Path<conversation::Id>,
        Json(params): Json<AddMemberParams>,
    ) -> crate::Result<StatusCode> {
        conversation_service
            .add_member(&id, auth_user.id(), &params.user_id)
            .await?;
        Ok(StatusCode::NO_CONTENT)
    }

    pub async fn remove_member(
        Extension(auth_user): Extension<auth::User>,
        State(conversation_service): State<conversation::Service>,
        Path((id, user_id)): Path<(conversation::Id, user::Id)>,
    ) -> crate::Result<StatusCode> {
        conversation_service
            .remove_member(&id, auth_user.id(), &user_id)
            .await?;
        Ok(StatusCode::NO_CONTENT)
    }

    pub async fn leave(
        Extension(auth_user): Extension<auth::User>,
        State(conversation_service): State<conversation::Service>,
        Path(id): Path<conversation::Id>,
    ) -> crate::Result<StatusCode> {
        conversation_service.leave(&id, auth_user.id()).await?;
        Ok(StatusCode::NO_CONTENT)
    }

    #[derive(Serialize)]
    pub struct AvatarDto {
        avatar: String,
    }

    pub async fn update_avatar(
        Extension(auth_user): Extension<auth::User>,
        State(conversation_service): State<conversation::Service>,
        Path(id): Path<conversation::Id>,
        multipart: Multipart,
    ) -> crate::Result<Json<AvatarDto>> {
        let upload = media::form::Form::read(multipart)
            .await?
            .take_upload()
            .ok_or(media::Error::MissingFile)?;

        let avatar = conversation_service
            .update_avatar(&id, auth_user.id(), &upload)
            .await?;
        Ok(Json(AvatarDto { avatar }))
    }

    pub async fn remove_avatar(
        Extension(auth_user): Extension<auth::User>,
        State(conversation_service): State<conversation::Service>,
        Path(id): Path<conversation::Id>,
    ) -> crate::Result<StatusCode> {
        conversation_service
            .remove_avatar(&id, auth_user.id())
            .await?;
        Ok(StatusCode::NO_CONTENT)
    }

    pub async fn generated_avatar(
        Path(id): Path<conversation::Id>,
    ) -> crate::Result<impl IntoResponse> {
        let png = media::identicon(&id.to_string())?;
        Ok(([(header::CONTENT_TYPE, "image/png")], png))
    }
}
