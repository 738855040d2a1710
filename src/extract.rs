//! Request extractors.

use axum::Json;
use axum::extract::{FromRequest, Request};
use serde::de::DeserializeOwned;

use crate::error::Failure;
use crate::validation::Validate;

/// JSON body that is deserialized and then validated.
///
/// Rejections are [`Failure`]s, so malformed bodies and schema violations get
/// the same normalized error body as every other failure:
///
/// ```rust,ignore
/// async fn create(ValidJson(input): ValidJson<CreateQuestion>) -> AppResult<Json<Question>> {
///     // `input` already passed `CreateQuestion::validate`
/// }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = Failure;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Self(value))
    }
}
