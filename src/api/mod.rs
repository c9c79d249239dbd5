use crate::error::{AppError, Error};
use axum::Router;

pub mod announcements;
pub mod applications;
pub mod auth;
pub mod clubs;
pub mod dues;
pub mod events;
pub mod fundraising;
pub mod notifications;
pub mod payments;
pub mod users;

pub fn app() -> Router {
    Router::new()
        .nest("/auth", auth::app())
        .merge(users::app())
        .merge(clubs::app())
        .merge(applications::app())
        .merge(events::app())
        .merge(fundraising::app())
        .merge(dues::app())
        .merge(announcements::app())
        .merge(notifications::app())
        .merge(payments::app())
}

/// Parses a path segment that may also be a fixed keyword such as `me`.
/// The router cannot tell `/users/me` from `/users/:id`, so handlers do.
pub(crate) enum Segment {
    Keyword,
    Id(i32),
}

impl Segment {
    pub(crate) fn parse(raw: &str, keyword: &str) -> Result<Segment, AppError> {
        if raw == keyword {
            return Ok(Segment::Keyword);
        }
        raw.parse()
            .map(Segment::Id)
            .map_err(|_| Error::validation(format!("invalid id: {raw}")).into())
    }
}
