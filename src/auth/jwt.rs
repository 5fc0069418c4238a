use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

/// Claims of tokens issued by the HR identity service. This service only verifies them.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: u64,
    pub sub: String,
    pub role: u8, // role id
    pub exp: usize,
    pub jti: String,

    pub token_type: TokenType,
    /// Present only if this user is linked to an employee record
    pub employee_id: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub enum TokenType {
    Access,
    Refresh,
}

/// Decodes and validates an access token. Refresh tokens are not accepted for API calls.
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, String> {
    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| e.to_string())?;

    if claims.token_type != TokenType::Access {
        return Err("refresh tokens cannot be used for API calls".to_string());
    }
    Ok(claims)
}


#[cfg(test)]
mod tests {
    use super::test_tokens::issue;
    use super::*;

    #[test]
    fn test_access_token_round_trip() {
        let token = issue(5, 3, Some(1000), TokenType::Access, "secret");
        let claims = verify_token(&token, "secret").unwrap();
        assert_eq!(claims.user_id, 5);
        assert_eq!(claims.employee_id, Some(1000));
    }

    #[test]
    fn test_refresh_token_and_wrong_secret_rejected() {
        let refresh = issue(5, 3, Some(1000), TokenType::Refresh, "secret");
        assert!(verify_token(&refresh, "secret").is_err());

        let access = issue(5, 3, Some(1000), TokenType::Access, "secret");
        assert!(verify_token(&access, "other").is_err());
    }
}
