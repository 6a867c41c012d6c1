use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::admin::{AdminService, SystemStats, UserChanges};
use crate::app::analytics::{
    AnalyticsService, CalendarEntry, CreatorStats, MasterclassAnalytics, PopularityStats,
    RevenuePeriod, RevenueReport,
};
use crate::app::auth::{AccessToken, AuthService, SignupInput};
use crate::app::masterclasses::{MasterclassService, MasterclassUpdate};
use crate::app::notifications::NotificationService;
use crate::app::registrations::{NewRegistration, RegistrationService};
use crate::app::reviews::ReviewService;
use crate::app::search::{CategoryCount, SearchFilters, SearchParams, SearchService, SortKey, SortOrder};
use crate::app::users::{CreatorDetails, NewUser, ProfileChanges, UserService};
use crate::app::validation::ValidationErrors;
use crate::domain::creator::{CreatorProfile, CreatorSummary};
use crate::domain::masterclass::{
    Masterclass, MasterclassChanges, MasterclassWithRating, NewMasterclass, RatingSummary,
};
use crate::domain::notification::Notification;
use crate::domain::registration::{Registration, RegistrationWithMasterclass};
use crate::domain::review::Review;
use crate::domain::user::{Role, User};
use crate::http::{AdminUser, AppError, AuthUser, CreatorUser};
use crate::AppState;

const DETAIL_REVIEWS: i64 = 3;

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(items: Vec<T>) -> Self {
        Self { items }
    }
}

fn internal(context: &'static str) -> impl FnOnce(anyhow::Error) -> AppError {
    move |err| {
        tracing::error!(error = ?err, "failed to {}", context);
        AppError::internal(format!("failed to {}", context))
    }
}

fn notifications(state: &AppState) -> NotificationService {
    NotificationService::new(state.db.clone(), state.mailer.clone())
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let db = state.db.ping().await.is_ok();
    let redis = state.cache.ping().await.is_ok();
    let status = if db && redis { "ok" } else { "degraded" };

    Json(HealthResponse { status })
}

// ============================================================================
// Auth
// ============================================================================

#[derive(Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub password: String,
}

#[derive(Deserialize)]
pub struct CreatorSignupRequest {
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub password: String,
    pub company_name: Option<String>,
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct AuthTokenResponse {
    #[serde(flatten)]
    pub token: AccessToken,
    pub user: User,
}

fn auth_service(state: &AppState) -> AuthService {
    AuthService::new(
        state.db.clone(),
        state.paseto_access_key,
        state.access_ttl_minutes,
    )
}

pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> Result<(StatusCode, Json<AuthTokenResponse>), AppError> {
    let service = auth_service(&state);
    let user = service
        .signup(SignupInput {
            email: payload.email,
            name: payload.name,
            phone: payload.phone,
            password: payload.password,
        })
        .await?;
    let token = service
        .issue_access_token(user.id)
        .map_err(internal("issue access token"))?;

    Ok((StatusCode::CREATED, Json(AuthTokenResponse { token, user })))
}

#[derive(Serialize)]
pub struct CreatorSignupResponse {
    #[serde(flatten)]
    pub token: AccessToken,
    pub user: User,
    pub profile: CreatorProfile,
}

pub async fn creator_signup(
    State(state): State<AppState>,
    Json(payload): Json<CreatorSignupRequest>,
) -> Result<(StatusCode, Json<CreatorSignupResponse>), AppError> {
    let service = auth_service(&state);
    let (user, profile) = service
        .signup_creator(
            SignupInput {
                email: payload.email,
                name: payload.name,
                phone: payload.phone,
                password: payload.password,
            },
            CreatorDetails {
                company_name: payload.company_name,
                description: payload.description,
            },
        )
        .await?;
    let token = service
        .issue_access_token(user.id)
        .map_err(internal("issue access token"))?;

    Ok((
        StatusCode::CREATED,
        Json(CreatorSignupResponse {
            token,
            user,
            profile,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthTokenResponse>, AppError> {
    const MAX_PASSWORD_LEN: usize = 128;

    if payload.email.trim().is_empty() || payload.password.trim().is_empty() {
        return Err(AppError::bad_request("email and password are required"));
    }
    if payload.password.len() > MAX_PASSWORD_LEN {
        return Err(AppError::bad_request("password must be at most 128 characters"));
    }

    let result = auth_service(&state)
        .login(&payload.email, &payload.password)
        .await
        .map_err(internal("login"))?;

    match result {
        Some((user, token)) => Ok(Json(AuthTokenResponse { token, user })),
        None => Err(AppError::unauthorized("invalid credentials")),
    }
}

pub async fn get_current_user(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<User>, AppError> {
    let user = UserService::new(state.db.clone())
        .get(auth.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))?;
    Ok(Json(user))
}

#[derive(Deserialize)]
pub struct UpdateAccountRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub password: Option<String>,
}

pub async fn update_account(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<UpdateAccountRequest>,
) -> Result<Json<User>, AppError> {
    let user = UserService::new(state.db.clone())
        .update_profile(
            auth.user_id,
            ProfileChanges {
                name: payload.name,
                phone: payload.phone,
                password: payload.password,
            },
        )
        .await?;
    Ok(Json(user))
}

// ============================================================================
// Public masterclasses and registrations
// ============================================================================

#[derive(Deserialize)]
pub struct MasterclassListQuery {
    pub category: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list_masterclasses(
    State(state): State<AppState>,
    Query(query): Query<MasterclassListQuery>,
) -> Result<Json<ListResponse<MasterclassWithRating>>, AppError> {
    let category = query
        .category
        .as_deref()
        .map(str::trim)
        .filter(|category| !category.is_empty())
        .map(str::to_lowercase);

    let masterclasses = MasterclassService::new(state.db.clone())
        .list_upcoming(category.as_deref(), query.limit)
        .await
        .map_err(internal("list masterclasses"))?;
    Ok(Json(masterclasses.into()))
}

#[derive(Serialize)]
pub struct MasterclassDetail {
    #[serde(flatten)]
    pub masterclass: MasterclassWithRating,
    pub can_register: bool,
    pub can_review: bool,
    pub recent_reviews: Vec<Review>,
}

pub async fn get_masterclass(
    State(state): State<AppState>,
    auth: Option<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<MasterclassDetail>, AppError> {
    let now = OffsetDateTime::now_utc();
    let masterclass = MasterclassService::new(state.db.clone())
        .get(id)
        .await
        .map_err(internal("fetch masterclass"))?
        .ok_or_else(|| AppError::not_found("masterclass not found"))?;

    let reviews = ReviewService::new(state.db.clone());
    let recent_reviews = reviews.list(id, true, Some(DETAIL_REVIEWS)).await?;
    let can_review = match &auth {
        Some(auth) => reviews.can_review(auth.user_id, id, now).await?,
        None => false,
    };

    Ok(Json(MasterclassDetail {
        can_register: masterclass.masterclass.can_register(now),
        masterclass,
        can_review,
        recent_reviews,
    }))
}

#[derive(Deserialize)]
pub struct RegistrationRequest {
    pub user_name: String,
    pub user_email: String,
    pub user_phone: Option<String>,
}

#[derive(Serialize)]
pub struct RegistrationResponse {
    pub message: String,
    pub registration: Registration,
    pub masterclass: Masterclass,
}

pub async fn register(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RegistrationRequest>,
) -> Result<(StatusCode, Json<RegistrationResponse>), AppError> {
    let (registration, masterclass) = RegistrationService::new(state.db.clone())
        .register(
            id,
            NewRegistration {
                user_name: payload.user_name,
                user_email: payload.user_email,
                user_phone: payload.user_phone,
            },
            OffsetDateTime::now_utc(),
        )
        .await?;

    notifications(&state)
        .registration_created(&registration, &masterclass)
        .await;

    Ok((
        StatusCode::CREATED,
        Json(RegistrationResponse {
            message: format!("You are registered for \"{}\"", masterclass.title),
            registration,
            masterclass,
        }),
    ))
}

#[derive(Deserialize)]
pub struct CancelRegistrationRequest {
    pub email: String,
}

pub async fn cancel_registration(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelRegistrationRequest>,
) -> Result<Json<RegistrationResponse>, AppError> {
    let (registration, masterclass) = RegistrationService::new(state.db.clone())
        .cancel(id, &payload.email, OffsetDateTime::now_utc())
        .await?;

    notifications(&state)
        .registration_cancelled(&registration, &masterclass)
        .await;

    Ok(Json(RegistrationResponse {
        message: format!("Your registration for \"{}\" was cancelled", masterclass.title),
        registration,
        masterclass,
    }))
}

#[derive(Deserialize)]
pub struct EmailQuery {
    pub email: Option<String>,
}

pub async fn list_registrations(
    State(state): State<AppState>,
    Query(query): Query<EmailQuery>,
) -> Result<Json<ListResponse<RegistrationWithMasterclass>>, AppError> {
    let registrations = RegistrationService::new(state.db.clone())
        .list_by_email(query.email.as_deref().unwrap_or(""), OffsetDateTime::now_utc())
        .await?;
    Ok(Json(registrations.into()))
}

// ============================================================================
// Search
// ============================================================================

#[derive(Deserialize)]
pub struct SearchModeQuery {
    pub ajax: Option<String>,
    pub save_preferences: Option<String>,
}

#[derive(Serialize)]
pub struct SearchItem {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub date_time: OffsetDateTime,
    pub category: Option<String>,
    pub price: Option<f64>,
    pub rating: Option<f64>,
    pub review_count: i64,
    pub current_participants: i32,
    pub max_participants: i32,
}

impl From<MasterclassWithRating> for SearchItem {
    fn from(rated: MasterclassWithRating) -> Self {
        let price = rated.masterclass.price();
        let masterclass = rated.masterclass;
        Self {
            id: masterclass.id,
            title: masterclass.title,
            description: masterclass.description,
            date_time: masterclass.date_time,
            category: masterclass.category,
            price,
            rating: rated.rating,
            review_count: rated.review_count,
            current_participants: masterclass.current_participants,
            max_participants: masterclass.max_participants,
        }
    }
}

#[derive(Serialize)]
pub struct CompactSearchResponse {
    pub masterclasses: Vec<SearchItem>,
    pub page: i64,
    pub has_more: bool,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub masterclasses: Vec<MasterclassWithRating>,
    pub page: i64,
    pub has_more: bool,
    pub sort_by: SortKey,
    pub sort_order: SortOrder,
    pub popular_categories: Vec<CategoryCount>,
    pub saved_preferences: Option<Value>,
    pub preferences_saved: bool,
}

fn is_flag_set(value: Option<&str>) -> bool {
    matches!(value.map(str::trim), Some("1") | Some("true") | Some("on"))
}

pub async fn search(
    State(state): State<AppState>,
    auth: Option<AuthUser>,
    headers: HeaderMap,
    Query(params): Query<SearchParams>,
    Query(mode): Query<SearchModeQuery>,
) -> Result<Response, AppError> {
    let is_ajax = is_flag_set(mode.ajax.as_deref())
        || headers
            .get("x-requested-with")
            .and_then(|value| value.to_str().ok())
            .map(|value| value.eq_ignore_ascii_case("XMLHttpRequest"))
            .unwrap_or(false);

    let filters = SearchFilters::from_params(&params);
    filters.validate()?;

    let service = SearchService::new(state.db.clone(), state.search_page_size);
    let page = service
        .search(&filters, OffsetDateTime::now_utc())
        .await
        .map_err(internal("search masterclasses"))?;

    let mut preferences_saved = false;
    if let Some(auth) = &auth {
        if is_flag_set(mode.save_preferences.as_deref()) {
            preferences_saved = service
                .save_preferences(auth.user_id, &filters.preferences())
                .await
                .map_err(internal("save search preferences"))?;
        }
    }

    if is_ajax {
        return Ok(Json(CompactSearchResponse {
            masterclasses: page.masterclasses.into_iter().map(SearchItem::from).collect(),
            page: page.page,
            has_more: page.has_more,
        })
        .into_response());
    }

    let popular_categories = service
        .popular_categories()
        .await
        .map_err(internal("load popular categories"))?;
    let saved_preferences = match &auth {
        Some(auth) => service
            .preferences(auth.user_id)
            .await
            .map_err(internal("load search preferences"))?,
        None => None,
    };

    Ok(Json(SearchResponse {
        masterclasses: page.masterclasses,
        page: page.page,
        has_more: page.has_more,
        sort_by: filters.sort_by,
        sort_order: filters.sort_order,
        popular_categories,
        saved_preferences,
        preferences_saved,
    })
    .into_response())
}

#[derive(Deserialize)]
pub struct AutocompleteQuery {
    pub q: Option<String>,
}

#[derive(Serialize)]
pub struct AutocompleteResponse {
    pub suggestions: Vec<String>,
}

/// Lookup failures degrade to an empty list.
pub async fn autocomplete(
    State(state): State<AppState>,
    Query(query): Query<AutocompleteQuery>,
) -> Json<AutocompleteResponse> {
    let service = SearchService::new(state.db.clone(), state.search_page_size);
    let suggestions = match service.autocomplete(query.q.as_deref().unwrap_or("")).await {
        Ok(suggestions) => suggestions,
        Err(err) => {
            tracing::error!(error = ?err, "autocomplete failed");
            Vec::new()
        }
    };
    Json(AutocompleteResponse { suggestions })
}

// ============================================================================
// Reviews
// ============================================================================

#[derive(Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct ReviewListResponse {
    pub items: Vec<Review>,
    #[serde(flatten)]
    pub summary: RatingSummary,
}

pub async fn list_reviews(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<ReviewListResponse>, AppError> {
    let exists = MasterclassService::new(state.db.clone())
        .get(id)
        .await
        .map_err(internal("fetch masterclass"))?
        .is_some();
    if !exists {
        return Err(AppError::not_found("masterclass not found"));
    }

    let reviews = ReviewService::new(state.db.clone());
    let items = reviews
        .list(id, true, query.limit.map(|limit| limit.clamp(1, 100)))
        .await?;
    let summary = reviews.summary(id).await?;
    Ok(Json(ReviewListResponse { items, summary }))
}

#[derive(Deserialize)]
pub struct CreateReviewRequest {
    pub rating: i16,
    pub comment: Option<String>,
}

pub async fn create_review(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<CreateReviewRequest>,
) -> Result<(StatusCode, Json<Review>), AppError> {
    let review = ReviewService::new(state.db.clone())
        .create(
            auth.user_id,
            id,
            payload.rating,
            payload.comment,
            OffsetDateTime::now_utc(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(review)))
}

#[derive(Deserialize)]
pub struct UpdateReviewRequest {
    pub rating: Option<i16>,
    pub comment: Option<String>,
}

pub async fn update_review(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateReviewRequest>,
) -> Result<Json<Review>, AppError> {
    let review = ReviewService::new(state.db.clone())
        .update(id, auth.user_id, payload.rating, payload.comment)
        .await?;
    Ok(Json(review))
}

/// Authors delete their own reviews; admins delete any.
pub async fn delete_review(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let owner = if auth.role == Role::Admin {
        None
    } else {
        Some(auth.user_id)
    };
    let deleted = ReviewService::new(state.db.clone()).delete(id, owner).await?;
    if !deleted {
        return Err(AppError::not_found("review not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Notifications
// ============================================================================

#[derive(Deserialize)]
pub struct NotificationQuery {
    pub unread_only: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list_notifications(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<ListResponse<Notification>>, AppError> {
    let items = notifications(&state)
        .list(
            auth.user_id,
            is_flag_set(query.unread_only.as_deref()),
            query.limit,
        )
        .await
        .map_err(internal("list notifications"))?;
    Ok(Json(items.into()))
}

#[derive(Serialize)]
pub struct UnreadCountResponse {
    pub count: i64,
}

pub async fn unread_notification_count(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<UnreadCountResponse>, AppError> {
    let count = notifications(&state)
        .unread_count(auth.user_id)
        .await
        .map_err(internal("count notifications"))?;
    Ok(Json(UnreadCountResponse { count }))
}

pub async fn mark_notification_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let updated = notifications(&state)
        .mark_read(id, auth.user_id)
        .await
        .map_err(internal("mark notification read"))?;
    if !updated {
        return Err(AppError::not_found("notification not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
pub struct MarkAllReadResponse {
    pub updated: u64,
}

pub async fn mark_all_notifications_read(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<MarkAllReadResponse>, AppError> {
    let updated = notifications(&state)
        .mark_all_read(auth.user_id)
        .await
        .map_err(internal("mark notifications read"))?;
    Ok(Json(MarkAllReadResponse { updated }))
}

pub async fn delete_notification(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let deleted = notifications(&state)
        .delete(id, auth.user_id)
        .await
        .map_err(internal("delete notification"))?;
    if !deleted {
        return Err(AppError::not_found("notification not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Creator
// ============================================================================

#[derive(Serialize)]
pub struct CreatorProfileResponse {
    pub user: User,
    pub profile: Option<CreatorProfile>,
}

pub async fn get_creator_profile(
    State(state): State<AppState>,
    CreatorUser(auth): CreatorUser,
) -> Result<Json<CreatorProfileResponse>, AppError> {
    let users = UserService::new(state.db.clone());
    let user = users
        .get(auth.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))?;
    let profile = users.creator_profile(auth.user_id).await?;
    Ok(Json(CreatorProfileResponse { user, profile }))
}

#[derive(Deserialize)]
pub struct UpdateCreatorProfileRequest {
    pub company_name: Option<String>,
    pub description: Option<String>,
}

pub async fn update_creator_profile(
    State(state): State<AppState>,
    CreatorUser(auth): CreatorUser,
    Json(payload): Json<UpdateCreatorProfileRequest>,
) -> Result<Json<CreatorProfile>, AppError> {
    let profile = UserService::new(state.db.clone())
        .update_creator_profile(auth.user_id, payload.company_name, payload.description)
        .await?;
    Ok(Json(profile))
}

pub async fn list_creator_masterclasses(
    State(state): State<AppState>,
    CreatorUser(auth): CreatorUser,
) -> Result<Json<ListResponse<MasterclassWithRating>>, AppError> {
    let masterclasses = MasterclassService::new(state.db.clone())
        .list_for_creator(auth.user_id)
        .await
        .map_err(internal("list creator masterclasses"))?;
    Ok(Json(masterclasses.into()))
}

#[derive(Deserialize)]
pub struct CreateMasterclassRequest {
    pub title: String,
    pub description: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub date_time: Option<OffsetDateTime>,
    pub max_participants: Option<i32>,
    pub price: Option<f64>,
    pub category: Option<String>,
}

pub async fn create_masterclass(
    State(state): State<AppState>,
    CreatorUser(auth): CreatorUser,
    Json(payload): Json<CreateMasterclassRequest>,
) -> Result<(StatusCode, Json<Masterclass>), AppError> {
    let masterclass = MasterclassService::new(state.db.clone())
        .create(
            auth.user_id,
            NewMasterclass {
                title: payload.title,
                description: payload.description,
                date_time: payload.date_time,
                max_participants: payload.max_participants,
                price: payload.price,
                category: payload.category,
            },
            OffsetDateTime::now_utc(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(masterclass)))
}

#[derive(Deserialize)]
pub struct UpdateMasterclassRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub date_time: Option<OffsetDateTime>,
    pub max_participants: Option<i32>,
    pub price: Option<f64>,
    pub category: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Serialize)]
pub struct MasterclassUpdateResponse {
    pub masterclass: Masterclass,
    pub changes: Vec<String>,
}

pub async fn update_masterclass(
    State(state): State<AppState>,
    CreatorUser(auth): CreatorUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateMasterclassRequest>,
) -> Result<Json<MasterclassUpdateResponse>, AppError> {
    let MasterclassUpdate {
        masterclass,
        changes,
        participants,
    } = MasterclassService::new(state.db.clone())
        .update(
            id,
            Some(auth.user_id),
            MasterclassChanges {
                title: payload.title,
                description: payload.description,
                date_time: payload.date_time,
                max_participants: payload.max_participants,
                price: payload.price,
                category: payload.category,
                is_active: payload.is_active,
            },
            OffsetDateTime::now_utc(),
        )
        .await?;

    if !changes.is_empty() {
        notifications(&state)
            .masterclass_updated(&masterclass, &participants, &changes)
            .await;
    }

    Ok(Json(MasterclassUpdateResponse {
        masterclass,
        changes,
    }))
}

pub async fn delete_creator_masterclass(
    State(state): State<AppState>,
    CreatorUser(auth): CreatorUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    delete_masterclass_and_notify(&state, id, Some(auth.user_id)).await
}

async fn delete_masterclass_and_notify(
    state: &AppState,
    id: Uuid,
    scope: Option<Uuid>,
) -> Result<StatusCode, AppError> {
    let (masterclass, registrations) = MasterclassService::new(state.db.clone())
        .delete(id, scope)
        .await?;
    notifications(state)
        .masterclass_cancelled(&masterclass, &registrations)
        .await;
    Ok(StatusCode::NO_CONTENT)
}

async fn owned_masterclass(
    state: &AppState,
    creator_id: Uuid,
    id: Uuid,
) -> Result<Masterclass, AppError> {
    MasterclassService::new(state.db.clone())
        .get_scoped(id, Some(creator_id))
        .await
        .map_err(internal("fetch masterclass"))?
        .ok_or_else(|| AppError::not_found("masterclass not found"))
}

pub async fn list_participants(
    State(state): State<AppState>,
    CreatorUser(auth): CreatorUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ListResponse<Registration>>, AppError> {
    owned_masterclass(&state, auth.user_id, id).await?;
    let participants = RegistrationService::new(state.db.clone())
        .participants(id)
        .await?;
    Ok(Json(participants.into()))
}

pub async fn export_participants_csv(
    State(state): State<AppState>,
    CreatorUser(auth): CreatorUser,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    owned_masterclass(&state, auth.user_id, id).await?;
    let csv = AnalyticsService::new(state.db.clone())
        .export_participants_csv(id)
        .await
        .map_err(internal("export participants"))?
        .ok_or_else(|| AppError::not_found("masterclass not found"))?;

    let disposition = format!("attachment; filename=\"participants_{}.csv\"", id);
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    )
        .into_response())
}

pub async fn masterclass_analytics(
    State(state): State<AppState>,
    CreatorUser(auth): CreatorUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MasterclassAnalytics>, AppError> {
    owned_masterclass(&state, auth.user_id, id).await?;
    let analytics = AnalyticsService::new(state.db.clone())
        .masterclass_analytics(id, OffsetDateTime::now_utc())
        .await
        .map_err(internal("load masterclass analytics"))?
        .ok_or_else(|| AppError::not_found("masterclass not found"))?;
    Ok(Json(analytics))
}

pub async fn creator_stats(
    State(state): State<AppState>,
    CreatorUser(auth): CreatorUser,
) -> Result<Json<CreatorStats>, AppError> {
    let stats = AnalyticsService::new(state.db.clone())
        .creator_stats(auth.user_id, OffsetDateTime::now_utc())
        .await
        .map_err(internal("load creator stats"))?;
    Ok(Json(stats))
}

#[derive(Deserialize)]
pub struct RevenueQuery {
    pub period: Option<String>,
}

pub async fn creator_revenue(
    State(state): State<AppState>,
    CreatorUser(auth): CreatorUser,
    Query(query): Query<RevenueQuery>,
) -> Result<Json<RevenueReport>, AppError> {
    let report = AnalyticsService::new(state.db.clone())
        .revenue_report(
            auth.user_id,
            RevenuePeriod::parse(query.period.as_deref()),
            OffsetDateTime::now_utc(),
        )
        .await
        .map_err(internal("load revenue report"))?;
    Ok(Json(report))
}

#[derive(Deserialize)]
pub struct CalendarQuery {
    pub year: Option<i32>,
    pub month: Option<u8>,
}

#[derive(Serialize)]
pub struct CalendarResponse {
    pub year: i32,
    pub month: u8,
    pub masterclasses: Vec<CalendarEntry>,
}

pub async fn creator_calendar(
    State(state): State<AppState>,
    CreatorUser(auth): CreatorUser,
    Query(query): Query<CalendarQuery>,
) -> Result<Json<CalendarResponse>, AppError> {
    let now = OffsetDateTime::now_utc();
    let year = query.year.unwrap_or(now.year());
    let month = query.month.unwrap_or(u8::from(now.month()));

    let mut errors = ValidationErrors::new();
    if !(1..=12).contains(&month) {
        errors.add("month", "Month must be between 1 and 12");
    }
    if !(1970..=9999).contains(&year) {
        errors.add("year", "Year is out of range");
    }
    errors.into_result()?;

    let masterclasses = AnalyticsService::new(state.db.clone())
        .calendar_view(auth.user_id, year, month, now)
        .await
        .map_err(internal("load calendar"))?;
    Ok(Json(CalendarResponse {
        year,
        month,
        masterclasses,
    }))
}

pub async fn creator_popularity(
    State(state): State<AppState>,
    CreatorUser(auth): CreatorUser,
) -> Result<Json<PopularityStats>, AppError> {
    let stats = AnalyticsService::new(state.db.clone())
        .popularity_stats(auth.user_id)
        .await
        .map_err(internal("load popularity stats"))?;
    Ok(Json(stats))
}

// ============================================================================
// Admin
// ============================================================================

#[derive(Deserialize)]
pub struct IncludeInactiveQuery {
    pub include_inactive: Option<String>,
}

pub async fn admin_list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<IncludeInactiveQuery>,
) -> Result<Json<ListResponse<User>>, AppError> {
    let users = AdminService::new(state.db.clone())
        .list_users(is_flag_set(query.include_inactive.as_deref()))
        .await?;
    Ok(Json(users.into()))
}

#[derive(Deserialize)]
pub struct AdminCreateUserRequest {
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub password: String,
    pub role: Option<Role>,
}

pub async fn admin_create_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(payload): Json<AdminCreateUserRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let user = AdminService::new(state.db.clone())
        .create_user(NewUser {
            email: payload.email,
            name: payload.name,
            phone: payload.phone,
            password: payload.password,
            role: payload.role.unwrap_or(Role::Visitor),
        })
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[derive(Deserialize)]
pub struct AdminUpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub is_active: Option<bool>,
    pub role: Option<Role>,
}

pub async fn admin_update_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdminUpdateUserRequest>,
) -> Result<Json<User>, AppError> {
    let user = AdminService::new(state.db.clone())
        .update_user(
            admin.user_id,
            id,
            UserChanges {
                name: payload.name,
                email: payload.email,
                phone: payload.phone,
                is_active: payload.is_active,
                role: payload.role,
            },
        )
        .await?;
    Ok(Json(user))
}

pub async fn admin_delete_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    AdminService::new(state.db.clone())
        .delete_user(admin.user_id, id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn admin_block_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, AppError> {
    let user = AdminService::new(state.db.clone())
        .set_active(admin.user_id, id, false)
        .await?;
    Ok(Json(user))
}

pub async fn admin_unblock_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, AppError> {
    let user = AdminService::new(state.db.clone())
        .set_active(admin.user_id, id, true)
        .await?;
    Ok(Json(user))
}

#[derive(Deserialize)]
pub struct AssignRoleRequest {
    pub role: Role,
}

pub async fn admin_assign_role(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignRoleRequest>,
) -> Result<Json<User>, AppError> {
    let user = AdminService::new(state.db.clone())
        .assign_role(admin.user_id, id, payload.role)
        .await?;
    Ok(Json(user))
}

pub async fn admin_list_creators(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<ListResponse<CreatorSummary>>, AppError> {
    let creators = AdminService::new(state.db.clone()).list_creators().await?;
    Ok(Json(creators.into()))
}

pub async fn admin_list_masterclasses(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<IncludeInactiveQuery>,
) -> Result<Json<ListResponse<MasterclassWithRating>>, AppError> {
    let masterclasses = AdminService::new(state.db.clone())
        .list_masterclasses(is_flag_set(query.include_inactive.as_deref()))
        .await?;
    Ok(Json(masterclasses.into()))
}

pub async fn admin_delete_masterclass(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    delete_masterclass_and_notify(&state, id, None).await
}

pub async fn admin_toggle_masterclass(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Masterclass>, AppError> {
    let masterclass = MasterclassService::new(state.db.clone())
        .toggle_active(id)
        .await
        .map_err(internal("toggle masterclass"))?
        .ok_or_else(|| AppError::not_found("masterclass not found"))?;
    tracing::info!(
        masterclass_id = %id,
        is_active = masterclass.is_active,
        "masterclass visibility toggled"
    );
    Ok(Json(masterclass))
}

#[derive(Deserialize)]
pub struct PendingQuery {
    pub pending: Option<String>,
}

pub async fn admin_list_reviews(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<PendingQuery>,
) -> Result<Json<ListResponse<Review>>, AppError> {
    let reviews = ReviewService::new(state.db.clone());
    let items = if is_flag_set(query.pending.as_deref()) {
        reviews.pending().await?
    } else {
        reviews.list_all().await?
    };
    Ok(Json(items.into()))
}

pub async fn admin_approve_review(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let updated = ReviewService::new(state.db.clone()).approve(id).await?;
    if !updated {
        return Err(AppError::not_found("review not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn admin_reject_review(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let updated = ReviewService::new(state.db.clone()).reject(id).await?;
    if !updated {
        return Err(AppError::not_found("review not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn admin_delete_review(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let deleted = ReviewService::new(state.db.clone()).delete(id, None).await?;
    if !deleted {
        return Err(AppError::not_found("review not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn admin_stats(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<SystemStats>, AppError> {
    let stats = AdminService::new(state.db.clone())
        .system_stats(OffsetDateTime::now_utc())
        .await?;
    Ok(Json(stats))
}
