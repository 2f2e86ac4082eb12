//! Account checks run before a load test
//!
//! Logging every identity in once up front surfaces missing or locked
//! accounts before hundreds of workers report them as launch failures.

use tracing::{info, warn};

use crate::identity::Identity;
use crate::platform::{PlatformError, PlatformFactory};

/// Outcome of a bulk login
#[derive(Debug, Default)]
pub struct LoginUsersResult {
    /// Session tokens of the identities that logged in, in input order
    pub session_tokens: Vec<String>,
    /// Failed identities by email
    pub errors: Vec<(String, PlatformError)>,
}

impl LoginUsersResult {
    pub fn all_succeeded(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Log in each identity on a fresh session, one after another
pub async fn login_users(
    platforms: &dyn PlatformFactory,
    server_url: &str,
    identities: &[Identity],
) -> LoginUsersResult {
    let mut result = LoginUsersResult::default();

    for identity in identities {
        let mut platform = platforms.connect(server_url);
        match platform.login(&identity.email, &identity.password).await {
            Ok(()) => match platform.session_token() {
                Some(token) => result.session_tokens.push(token),
                None => result.errors.push((
                    identity.email.clone(),
                    PlatformError::Decode("no session token after login".into()),
                )),
            },
            Err(e) => {
                warn!("Login failed for {}: {}", identity.email, e);
                result.errors.push((identity.email.clone(), e));
            }
        }
    }

    info!(
        "Logged in {}/{} users",
        result.session_tokens.len(),
        identities.len()
    );
    result
}
