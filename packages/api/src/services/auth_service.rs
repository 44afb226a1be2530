use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::services::errors::auth_service_errors::AuthServiceError;

const TOKEN_LIFETIME_HOURS: i64 = 24;

/// `sub` is the car or station user id the caller acts as.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedToken {
    pub token: String,
    pub token_type: String,
    pub expires_in: i64,
}

pub trait AuthServiceTrait: Send + Sync {
    fn verify_token(&self, token: &str) -> Result<TokenClaims, AuthServiceError>;
    fn extract_user_id_from_token(&self, token: &str) -> Result<String, AuthServiceError>;
    fn generate_token(&self, user_id: &str) -> Result<IssuedToken, AuthServiceError>;
}

/// Verifies HS256 bearer tokens issued by the account service.
pub struct AuthService {
    jwt_secret: String,
}

impl AuthService {
    pub fn with_jwt_secret(jwt_secret: String) -> Self {
        AuthService { jwt_secret }
    }
}

impl AuthServiceTrait for AuthService {
    fn verify_token(&self, token: &str) -> Result<TokenClaims, AuthServiceError> {
        let decoding_key = DecodingKey::from_secret(self.jwt_secret.as_ref());
        let validation = Validation::default();

        match decode::<TokenClaims>(token, &decoding_key, &validation) {
            Ok(token_data) if token_data.claims.sub.is_empty() => {
                Err(AuthServiceError::InvalidToken)
            }
            Ok(token_data) => Ok(token_data.claims),
            Err(err) => match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    Err(AuthServiceError::ExpiredToken)
                }
                _ => Err(AuthServiceError::InvalidToken),
            },
        }
    }

    fn extract_user_id_from_token(&self, token: &str) -> Result<String, AuthServiceError> {
        let claims = self.verify_token(token)?;
        Ok(claims.sub)
    }

    fn generate_token(&self, user_id: &str) -> Result<IssuedToken, AuthServiceError> {
        let now = Utc::now();
        let claims = TokenClaims {
            sub: user_id.to_string(),
            exp: (now + Duration::hours(TOKEN_LIFETIME_HOURS)).timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_ref()),
        )
        .map_err(|e| AuthServiceError::JwtError(format!("{:#?}", e)))?;

        Ok(IssuedToken {
            token,
            token_type: "Bearer".to_string(),
            expires_in: TOKEN_LIFETIME_HOURS * 60 * 60,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AuthService {
        AuthService::with_jwt_secret("test-secret-key".to_string())
    }

    #[test]
    fn test_token_generation_and_verification_roundtrip() {
        let auth_service = service();

        let issued = auth_service.generate_token("station-1").unwrap();

        assert_eq!(issued.token_type, "Bearer");
        assert_eq!(issued.expires_in, 24 * 60 * 60);
        let claims = auth_service.verify_token(&issued.token).unwrap();
        assert_eq!(claims.sub, "station-1");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_verify_token_invalid() {
        let result = service().verify_token("invalid-token");

        assert!(matches!(result, Err(AuthServiceError::InvalidToken)));
    }

    #[test]
    fn test_token_signed_with_other_secret_is_rejected() {
        let issued = AuthService::with_jwt_secret("other-secret".to_string())
            .generate_token("car-1")
            .unwrap();

        let result = service().extract_user_id_from_token(&issued.token);

        assert!(matches!(result, Err(AuthServiceError::InvalidToken)));
    }

    #[test]
    fn test_expired_token_is_reported() {
        let long_ago = Utc::now().timestamp() as usize - 3 * 60 * 60;
        let claims = TokenClaims {
            sub: "car-1".to_string(),
            exp: long_ago,
            iat: long_ago - 60,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret("test-secret-key".as_ref()),
        )
        .unwrap();

        let result = service().verify_token(&token);

        assert!(matches!(result, Err(AuthServiceError::ExpiredToken)));
    }

    #[test]
    fn test_extract_user_id_from_token() {
        let auth_service = service();
        let issued = auth_service.generate_token("car-7").unwrap();

        assert_eq!(
            auth_service.extract_user_id_from_token(&issued.token).unwrap(),
            "car-7"
        );
    }
}
