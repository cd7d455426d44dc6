use campus_login::TokenData;

use crate::client::ApiClient;
use crate::error::ClientError;
use crate::types::LoginRequest;
use crate::types::RegisterOutcome;
use crate::types::RegisterRequest;
use crate::types::TokenResponse;
use crate::types::UserProfile;
use crate::types::VerifyEmailOtpRequest;

/// Typed wrappers for the credential endpoints. These are the only endpoints
/// the client models; everything else goes through the generic JSON surface.
impl ApiClient {
    /// Exchange credentials for a token pair and adopt it into the session.
    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile, ClientError> {
        let response: TokenResponse = self
            .post_json("/auth/login", &LoginRequest { email, password })
            .await?;
        Ok(self.adopt(response))
    }

    pub async fn register(
        &self,
        request: &RegisterRequest<'_>,
    ) -> Result<RegisterOutcome, ClientError> {
        self.post_json("/auth/register", request).await
    }

    /// Completes registration. The backend hands out the first token pair
    /// here, not on `/auth/register`.
    pub async fn verify_email_otp(
        &self,
        email: &str,
        otp: &str,
    ) -> Result<UserProfile, ClientError> {
        let response: TokenResponse = self
            .post_json("/auth/verify-email-otp", &VerifyEmailOtpRequest { email, otp })
            .await?;
        Ok(self.adopt(response))
    }

    pub async fn current_user(&self) -> Result<UserProfile, ClientError> {
        self.get_json("/auth/me").await
    }

    /// Client-side logout: drop the session locally. The backend keeps no
    /// server-side session to tear down.
    pub fn logout(&self) {
        self.session().logout();
    }

    fn adopt(&self, response: TokenResponse) -> UserProfile {
        self.session()
            .adopt_tokens(TokenData::from_raw(
                response.access_token,
                response.refresh_token,
            ));
        response.user
    }
}
