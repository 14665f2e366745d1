use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use aisatsu_types::api::ErrorResponse;

/// Request-level error taxonomy. The display strings are the user-facing
/// messages; anything with an underlying cause is logged server-side and the
/// client only ever sees the generic text.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("ニックネームを入力してください")]
    EmptyName,

    #[error("IDが不足しています")]
    MissingIds,

    #[error("自分自身とはペアリングできません")]
    SelfPair,

    #[error("データが不足しています")]
    MissingData,

    #[error("ユーザーが見つかりません")]
    UserNotFound,

    #[error("ペアリングされていません")]
    NotPaired,

    #[error("相手が通知を許可していません")]
    PartnerNotSubscribed,

    #[error("無効なメッセージタイプです")]
    InvalidMessageType,

    /// The 6-digit id space yielded no free candidate within the retry
    /// bound. With 900,000 possible values this means the instance is far
    /// beyond its intended two-users-per-pairing scale.
    #[error("登録に失敗しました")]
    IdSpaceExhausted,

    /// Storage failure, translated to a per-endpoint generic message.
    #[error("{public}")]
    Internal {
        public: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl ApiError {
    pub fn internal(public: &'static str, source: anyhow::Error) -> Self {
        Self::Internal { public, source }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::EmptyName
            | ApiError::MissingIds
            | ApiError::SelfPair
            | ApiError::MissingData
            | ApiError::NotPaired
            | ApiError::PartnerNotSubscribed
            | ApiError::InvalidMessageType => StatusCode::BAD_REQUEST,
            ApiError::UserNotFound => StatusCode::NOT_FOUND,
            ApiError::IdSpaceExhausted | ApiError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Internal { public, source } => {
                error!("request failed ({public}): {source:#}");
            }
            ApiError::IdSpaceExhausted => {
                error!("user id space exhausted — registration failing, operator attention needed");
            }
            _ => {}
        }

        let body = Json(ErrorResponse {
            error: self.to_string(),
        });
        (self.status(), body).into_response()
    }
}
