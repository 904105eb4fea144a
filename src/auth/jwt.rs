use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::Error};
use uuid::Uuid;

use crate::models::{Claims, TokenType};

fn now() -> usize {
    Utc::now().timestamp().max(0) as usize
}

/// Who a token is issued for.
#[derive(Debug, Clone)]
pub struct Subject {
    pub user_id: u64,
    pub email: String,
    pub role: u8,
    pub employee_id: Option<u64>,
}

fn issue(
    subject: &Subject,
    token_type: TokenType,
    secret: &str,
    ttl: usize,
) -> Result<(String, Claims), Error> {
    let claims = Claims {
        user_id: subject.user_id,
        sub: subject.email.clone(),
        role: subject.role,
        exp: now() + ttl,
        jti: Uuid::new_v4().to_string(),
        token_type,
        employee_id: subject.employee_id,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok((token, claims))
}

pub fn generate_access_token(
    subject: &Subject,
    secret: &str,
    ttl: usize,
) -> Result<(String, Claims), Error> {
    issue(subject, TokenType::Access, secret, ttl)
}

pub fn generate_refresh_token(
    subject: &Subject,
    secret: &str,
    ttl: usize,
) -> Result<(String, Claims), Error> {
    issue(subject, TokenType::Refresh, secret, ttl)
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, Error> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject() -> Subject {
        Subject {
            user_id: 7,
            email: "hr@agency.gov".to_string(),
            role: 2,
            employee_id: Some(12),
        }
    }

    #[test]
    fn access_token_round_trip() {
        let (token, issued) = generate_access_token(&subject(), "secret", 900).unwrap();
        let claims = verify_token(&token, "secret").unwrap();

        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.sub, "hr@agency.gov");
        assert_eq!(claims.role, 2);
        assert_eq!(claims.employee_id, Some(12));
        assert_eq!(claims.token_type, TokenType::Access);
        assert_eq!(claims.jti, issued.jti);
    }

    #[test]
    fn refresh_tokens_are_typed() {
        let (token, _) = generate_refresh_token(&subject(), "secret", 900).unwrap();
        assert_eq!(verify_token(&token, "secret").unwrap().token_type, TokenType::Refresh);
    }

    #[test]
    fn every_token_gets_its_own_jti() {
        let (_, a) = generate_access_token(&subject(), "secret", 900).unwrap();
        let (_, b) = generate_access_token(&subject(), "secret", 900).unwrap();
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let (token, _) = generate_access_token(&subject(), "secret", 900).unwrap();
        assert!(verify_token(&token, "other").is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let mut claims = generate_access_token(&subject(), "secret", 900).unwrap().1;
        // well past the default 60s leeway
        claims.exp = now() - 3600;
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();
        assert!(verify_token(&token, "secret").is_err());
    }
}
