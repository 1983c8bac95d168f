//! Portfolio handlers.

use crate::api::AppState;
use crate::domain::Portfolio;
use crate::error::AppError;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

/// Stand-in owner until authentication exists; every unowned request acts
/// as this user.
pub(crate) fn demo_user() -> Uuid {
    Uuid::parse_str("00000000-0000-0000-0000-000000000001").expect("static uuid")
}

#[derive(Debug, Deserialize)]
pub struct CreatePortfolioRequest {
    pub name: String,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
}

/// POST /portfolios
pub async fn create_portfolio(
    State(state): State<AppState>,
    Json(request): Json<CreatePortfolioRequest>,
) -> Result<(StatusCode, Json<Portfolio>), AppError> {
    if request.name.trim().is_empty() {
        return Err(AppError::Validation("name must not be empty".to_string()));
    }

    let portfolio = state
        .repo
        .create_portfolio(
            request.user_id.unwrap_or_else(demo_user),
            request.name.trim(),
            request.description.as_deref(),
            request.currency.as_deref().unwrap_or("TWD"),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(portfolio)))
}

/// GET /portfolios/{portfolio_id}
pub async fn get_portfolio(
    Path(portfolio_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Portfolio>, AppError> {
    let portfolio = state
        .repo
        .get_portfolio(portfolio_id)
        .await?
        .ok_or_else(|| AppError::NotFound("portfolio not found".to_string()))?;
    Ok(Json(portfolio))
}

#[derive(Debug, Deserialize)]
pub struct ListPortfoliosQuery {
    pub user_id: Option<Uuid>,
}

/// GET /portfolios
pub async fn list_portfolios(
    Query(params): Query<ListPortfoliosQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<Portfolio>>, AppError> {
    let portfolios = state
        .repo
        .list_portfolios(params.user_id.unwrap_or_else(demo_user))
        .await?;
    Ok(Json(portfolios))
}
