use std::collections::HashSet;
use std::future::{ready, Ready};

use actix_web::{dev::Payload, FromRequest, HttpRequest};
use async_trait::async_trait;

use crate::api::jobs::ServiceError;

/// Header carrying the authenticated user id, set by the upstream auth layer
pub const USER_ID_HEADER: &str = "X-User-Id";

/// Identity of the user making a request
#[derive(Debug, Clone, PartialEq)]
pub struct Caller {
    pub user_id: String,
}

impl FromRequest for Caller {
    type Error = ServiceError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let user_id = req
            .headers()
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        ready(match user_id {
            Some(id) => Ok(Caller {
                user_id: id.to_string(),
            }),
            None => Err(ServiceError::Unauthorized),
        })
    }
}

/// Answers whether a user holds the admin role
#[async_trait]
pub trait AdminDirectory: Send + Sync {
    async fn is_admin(&self, user_id: &str) -> bool;
}

/// Admin list fixed at startup
pub struct StaticAdminDirectory {
    admins: HashSet<String>,
}

impl StaticAdminDirectory {
    pub fn new(admins: impl IntoIterator<Item = String>) -> Self {
        Self {
            admins: admins.into_iter().collect(),
        }
    }
}

#[async_trait]
impl AdminDirectory for StaticAdminDirectory {
    async fn is_admin(&self, user_id: &str) -> bool {
        self.admins.contains(user_id)
    }
}
