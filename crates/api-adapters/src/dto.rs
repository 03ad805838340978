//! Request bodies accepted by the API and their conversion into service inputs.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use domains::{AppError, MediaUpload, QuestionStatus, Result, Role, VoteChoice};
use services::{NewAnswer, NewQuestion, PageRequest, QuestionChanges, QuestionQuery};

/// Upper bound on images attached to one question or answer.
pub const IMAGES_MAX: usize = 5;

/// An inline image: `{"contentType": "image/png", "data": "<base64>"}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePayload {
    pub content_type: String,
    pub data: String,
}

impl ImagePayload {
    pub fn into_upload(self) -> Result<MediaUpload> {
        let content_type: mime::Mime = self
            .content_type
            .parse()
            .map_err(|_| AppError::Validation(format!("unknown content type {}", self.content_type)))?;
        if content_type.type_() != mime::IMAGE {
            return Err(AppError::Validation("only images can be attached".into()));
        }
        let bytes = STANDARD
            .decode(self.data.as_bytes())
            .map_err(|_| AppError::Validation("image data must be base64".into()))?;
        if bytes.is_empty() {
            return Err(AppError::Validation("image data is empty".into()));
        }
        Ok(MediaUpload {
            bytes: Bytes::from(bytes),
            content_type,
        })
    }
}

fn uploads(images: Vec<ImagePayload>) -> Result<Vec<MediaUpload>> {
    if images.len() > IMAGES_MAX {
        return Err(AppError::Validation(format!(
            "at most {IMAGES_MAX} images per post"
        )));
    }
    images.into_iter().map(ImagePayload::into_upload).collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    /// Email address or username
    #[serde(alias = "email", alias = "username")]
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AskQuestionRequest {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub images: Vec<ImagePayload>,
}

impl TryFrom<AskQuestionRequest> for NewQuestion {
    type Error = AppError;

    fn try_from(req: AskQuestionRequest) -> Result<Self> {
        Ok(NewQuestion {
            title: req.title,
            description: req.description,
            tags: req.tags,
            images: uploads(req.images)?,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateQuestionRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub status: Option<QuestionStatus>,
}

impl From<UpdateQuestionRequest> for QuestionChanges {
    fn from(req: UpdateQuestionRequest) -> Self {
        QuestionChanges {
            title: req.title,
            description: req.description,
            tags: req.tags,
            status: req.status,
        }
    }
}

/// Query string of `GET /api/questions`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuestionsParams {
    pub status: Option<QuestionStatus>,
    pub tag: Option<String>,
    pub search: Option<String>,
    pub author: Option<Uuid>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

impl From<ListQuestionsParams> for QuestionQuery {
    fn from(params: ListQuestionsParams) -> Self {
        QuestionQuery {
            status: params.status,
            tag: params.tag.filter(|t| !t.trim().is_empty()),
            search: params.search.filter(|s| !s.trim().is_empty()),
            author: params.author,
            page: PageRequest {
                page: params.page,
                limit: params.limit,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostAnswerRequest {
    pub content: String,
    #[serde(default)]
    pub images: Vec<ImagePayload>,
}

impl TryFrom<PostAnswerRequest> for NewAnswer {
    type Error = AppError;

    fn try_from(req: PostAnswerRequest) -> Result<Self> {
        Ok(NewAnswer {
            content: req.content,
            images: uploads(req.images)?,
        })
    }
}

/// Body of every content-only write (answer edit, comment post/edit, announcement).
#[derive(Debug, Clone, Deserialize)]
pub struct ContentRequest {
    pub content: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub vote_type: VoteChoice,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct StatusRequest {
    pub status: QuestionStatus,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RoleRequest {
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpdatedCount {
    pub updated: u64,
}
