use crate::error::JoinError;
use classmeet_core::{ConnectionId, RoomId};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

/// Decides whether a connection may enter a room.
pub trait JoinGuard: Send + Sync + 'static {
    fn authorize(
        &self,
        connection_id: &ConnectionId,
        room: &RoomId,
        token: Option<&str>,
    ) -> Result<(), JoinError>;
}

/// Anyone holding a well-formed meeting code gets in.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAccess;

impl JoinGuard for OpenAccess {
    fn authorize(&self, _: &ConnectionId, _: &RoomId, _: Option<&str>) -> Result<(), JoinError> {
        Ok(())
    }
}

/// Claims issued by the auth service on login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingClaims {
    pub user_id: String,
    pub exp: usize,
    #[serde(default)]
    pub iat: Option<usize>,
    /// When present, the only meeting codes this token opens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meetings: Option<Vec<String>>,
}

/// Requires an HS256 bearer token signed with the auth service's secret.
pub struct BearerTokenGuard {
    key: DecodingKey,
    validation: Validation,
}

impl BearerTokenGuard {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn verify(&self, token: &str) -> Result<MeetingClaims, JoinError> {
        decode::<MeetingClaims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| JoinError::Unauthorized(e.to_string()))
    }
}

impl JoinGuard for BearerTokenGuard {
    fn authorize(
        &self,
        connection_id: &ConnectionId,
        room: &RoomId,
        token: Option<&str>,
    ) -> Result<(), JoinError> {
        let token = token.ok_or_else(|| JoinError::Unauthorized("token required".into()))?;
        let claims = self.verify(token)?;

        if let Some(meetings) = &claims.meetings {
            if !meetings.iter().any(|m| m == room.as_str()) {
                return Err(JoinError::Unauthorized(format!(
                    "token does not grant access to {}",
                    room
                )));
            }
        }

        tracing::debug!(
            connection_id = %connection_id,
            user_id = %claims.user_id,
            room = %room,
            "join authorized"
        );
        Ok(())
    }
}
