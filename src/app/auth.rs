use anyhow::{anyhow, Result};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use pasetors::claims::{Claims, ClaimsValidationRules};
use pasetors::keys::SymmetricKey;
use pasetors::token::UntrustedToken;
use pasetors::{local, Local, version4::V4};
use serde::Serialize;
use sqlx::Row;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::app::users::{
    user_from_row, CreatorDetails, NewUser, UserError, UserService, USER_COLUMNS,
};
use crate::domain::creator::CreatorProfile;
use crate::app::validation::normalize_email;
use crate::domain::user::{Role, User};
use crate::infra::db::Db;

const TOKEN_ISSUER: &str = "atelier";
const TOKEN_AUDIENCE: &str = "atelier";

#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user_id: Uuid,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessToken {
    pub access_token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct SignupInput {
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub password: String,
}

#[derive(Clone)]
pub struct AuthService {
    db: Db,
    access_key: [u8; 32],
    access_ttl_minutes: u64,
}

impl AuthService {
    pub fn new(db: Db, access_key: [u8; 32], access_ttl_minutes: u64) -> Self {
        Self {
            db,
            access_key,
            access_ttl_minutes,
        }
    }

    /// Public signup always creates a visitor.
    pub async fn signup(&self, input: SignupInput) -> Result<User, UserError> {
        UserService::new(self.db.clone())
            .create(NewUser {
                email: input.email,
                name: input.name,
                phone: input.phone,
                password: input.password,
                role: Role::Visitor,
            })
            .await
    }

    /// Self-registration for creators; the profile is created with the account.
    pub async fn signup_creator(
        &self,
        input: SignupInput,
        details: CreatorDetails,
    ) -> Result<(User, CreatorProfile), UserError> {
        UserService::new(self.db.clone())
            .create_creator(
                NewUser {
                    email: input.email,
                    name: input.name,
                    phone: input.phone,
                    password: input.password,
                    role: Role::Creator,
                },
                details,
            )
            .await
    }

    /// Blocked accounts and wrong passwords both yield `None`.
    pub async fn login(&self, email: &str, password: &str) -> Result<Option<(User, AccessToken)>> {
        let row = sqlx::query(&format!(
            "SELECT {}, password_hash FROM users WHERE email = $1",
            USER_COLUMNS
        ))
        .bind(normalize_email(email))
        .fetch_optional(self.db.pool())
        .await?;

        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };

        let password_hash: String = row.get("password_hash");
        if password_hash.is_empty() || !verify_password(password, &password_hash)? {
            return Ok(None);
        }

        let user = user_from_row(&row);
        if !user.is_active {
            tracing::info!(user_id = %user.id, "login refused for blocked account");
            return Ok(None);
        }

        let token = self.issue_access_token(user.id)?;
        Ok(Some((user, token)))
    }

    /// Role and active flag come from the database, not the token.
    pub async fn authenticate_access_token(&self, token: &str) -> Result<Option<AuthSession>> {
        let claims = match self.decrypt_claims(token)? {
            Some(claims) => claims,
            None => return Ok(None),
        };
        if !has_token_type(&claims, "access") {
            return Ok(None);
        }
        let user_id = claim_uuid(&claims, "sub")?;

        let row = sqlx::query("SELECT role::text AS role, is_active FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(self.db.pool())
            .await?;
        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };
        if !row.get::<bool, _>("is_active") {
            return Ok(None);
        }
        let role: String = row.get("role");
        let role = Role::from_db(&role).ok_or_else(|| anyhow!("unknown role {}", role))?;

        Ok(Some(AuthSession { user_id, role }))
    }

    pub fn issue_access_token(&self, user_id: Uuid) -> Result<AccessToken> {
        let (claims, expires_at) = self.build_access_claims(user_id)?;
        let key = SymmetricKey::<V4>::from(&self.access_key)?;
        let access_token = local::encrypt(&key, &claims, None, None)?;
        Ok(AccessToken {
            access_token,
            expires_at,
        })
    }

    fn decrypt_claims(&self, token: &str) -> Result<Option<Claims>> {
        let key = SymmetricKey::<V4>::from(&self.access_key)?;
        let mut rules = ClaimsValidationRules::new();
        rules.validate_issuer_with(TOKEN_ISSUER);
        rules.validate_audience_with(TOKEN_AUDIENCE);

        let untrusted = match UntrustedToken::<Local, V4>::try_from(token) {
            Ok(token) => token,
            Err(_) => return Ok(None),
        };
        let trusted = match local::decrypt(&key, &untrusted, &rules, None, None) {
            Ok(token) => token,
            Err(_) => return Ok(None),
        };
        Ok(trusted.payload_claims().cloned())
    }

    fn build_access_claims(&self, user_id: Uuid) -> Result<(Claims, OffsetDateTime)> {
        let duration = std::time::Duration::from_secs(self.access_ttl_minutes * 60);
        let mut claims = Claims::new_expires_in(&duration)?;
        claims.issuer(TOKEN_ISSUER)?;
        claims.audience(TOKEN_AUDIENCE)?;
        claims.subject(&user_id.to_string())?;
        claims.add_additional("typ", "access")?;
        let expires_at =
            OffsetDateTime::now_utc() + Duration::minutes(self.access_ttl_minutes as i64);
        Ok((claims, expires_at))
    }
}

pub(crate) fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut argon2::password_hash::rand_core::OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow!("failed to hash password: {}", err))?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|err| anyhow!("failed to parse password hash: {}", err))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn claim_uuid(claims: &Claims, name: &str) -> Result<Uuid> {
    let value = claims
        .get_claim(name)
        .and_then(|value| value.as_str())
        .ok_or_else(|| anyhow!("missing {} claim", name))?;
    Ok(Uuid::parse_str(value)?)
}

fn has_token_type(claims: &Claims, expected: &str) -> bool {
    claims
        .get_claim("typ")
        .and_then(|value| value.as_str())
        .map(|value| value == expected)
        .unwrap_or(false)
}
