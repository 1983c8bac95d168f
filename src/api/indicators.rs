//! Indicator handlers.

use crate::analysis::MaType;
use crate::api::events::parse_symbol;
use crate::api::AppState;
use crate::error::AppError;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::str::FromStr;

const DEFAULT_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct MaQuery {
    pub period: Option<usize>,
    #[serde(rename = "type")]
    pub ma_type: Option<String>,
    pub limit: Option<usize>,
}

/// GET /indicators/{symbol}/ma?period&type&limit
pub async fn get_ma(
    Path(symbol): Path<String>,
    Query(params): Query<MaQuery>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let symbol = parse_symbol(&symbol)?;
    let period = params.period.unwrap_or(20);
    let ma_type = match params.ma_type.as_deref() {
        None => MaType::Sma,
        Some(raw) => MaType::from_str(raw).map_err(AppError::Validation)?,
    };
    let limit = limit_or_default(params.limit);

    let values = state.indicators.ma(&symbol, period, ma_type, limit).await?;
    Ok(Json(json!({
        "success": true,
        "symbol": symbol.code(),
        "indicator": "MA",
        "params": {"period": period, "type": ma_type.to_string()},
        "count": values.len(),
        "data": values,
    })))
}

#[derive(Debug, Deserialize)]
pub struct RsiQuery {
    pub period: Option<usize>,
    pub limit: Option<usize>,
}

/// GET /indicators/{symbol}/rsi?period&limit
pub async fn get_rsi(
    Path(symbol): Path<String>,
    Query(params): Query<RsiQuery>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let symbol = parse_symbol(&symbol)?;
    let period = params.period.unwrap_or(14);
    let limit = limit_or_default(params.limit);

    let values = state.indicators.rsi(&symbol, period, limit).await?;
    Ok(Json(json!({
        "success": true,
        "symbol": symbol.code(),
        "indicator": "RSI",
        "params": {"period": period},
        "count": values.len(),
        "data": values,
    })))
}

#[derive(Debug, Deserialize)]
pub struct MacdQuery {
    pub fast: Option<usize>,
    pub slow: Option<usize>,
    pub signal: Option<usize>,
    pub limit: Option<usize>,
}

/// GET /indicators/{symbol}/macd?fast&slow&signal&limit
pub async fn get_macd(
    Path(symbol): Path<String>,
    Query(params): Query<MacdQuery>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let symbol = parse_symbol(&symbol)?;
    let fast = params.fast.unwrap_or(12);
    let slow = params.slow.unwrap_or(26);
    let signal = params.signal.unwrap_or(9);
    let limit = limit_or_default(params.limit);

    let values = state
        .indicators
        .macd(&symbol, fast, slow, signal, limit)
        .await?;
    Ok(Json(json!({
        "success": true,
        "symbol": symbol.code(),
        "indicator": "MACD",
        "params": {"fast": fast, "slow": slow, "signal": signal},
        "count": values.len(),
        "data": values,
    })))
}

#[derive(Debug, Deserialize)]
pub struct BollingerQuery {
    pub period: Option<usize>,
    pub stddev: Option<f64>,
    pub limit: Option<usize>,
}

/// GET /indicators/{symbol}/bb?period&stddev&limit
pub async fn get_bollinger(
    Path(symbol): Path<String>,
    Query(params): Query<BollingerQuery>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let symbol = parse_symbol(&symbol)?;
    let period = params.period.unwrap_or(20);
    let stddev = params.stddev.unwrap_or(2.0);
    let limit = limit_or_default(params.limit);

    let values = state
        .indicators
        .bollinger(&symbol, period, stddev, limit)
        .await?;
    Ok(Json(json!({
        "success": true,
        "symbol": symbol.code(),
        "indicator": "BB",
        "params": {"period": period, "stddev": stddev},
        "count": values.len(),
        "data": values,
    })))
}

#[derive(Debug, Deserialize)]
pub struct KdjQuery {
    pub period: Option<usize>,
    pub limit: Option<usize>,
}

/// GET /indicators/{symbol}/kdj?period&limit
pub async fn get_kdj(
    Path(symbol): Path<String>,
    Query(params): Query<KdjQuery>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let symbol = parse_symbol(&symbol)?;
    let period = params.period.unwrap_or(9);
    let limit = limit_or_default(params.limit);

    let values = state.indicators.kdj(&symbol, period, limit).await?;
    Ok(Json(json!({
        "success": true,
        "symbol": symbol.code(),
        "indicator": "KDJ",
        "params": {"period": period},
        "count": values.len(),
        "data": values,
    })))
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub indicators: Vec<String>,
    #[serde(default)]
    pub params: BatchParams,
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BatchParams {
    pub period: Option<usize>,
    #[serde(rename = "type")]
    pub ma_type: Option<String>,
    pub fast: Option<usize>,
    pub slow: Option<usize>,
    pub signal: Option<usize>,
    pub stddev: Option<f64>,
}

/// POST /indicators/{symbol}/batch
///
/// Computes any subset of indicators in one request. Individual failures
/// land in `errors` rather than failing the whole batch.
pub async fn get_batch(
    Path(symbol): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<BatchRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let symbol = parse_symbol(&symbol)?;
    let limit = limit_or_default(request.limit);

    let mut data = serde_json::Map::new();
    let mut errors = serde_json::Map::new();

    for name in &request.indicators {
        let result = match name.as_str() {
            "MA" => {
                let ma_type = match request.params.ma_type.as_deref() {
                    None => Ok(MaType::Sma),
                    Some(raw) => MaType::from_str(raw).map_err(AppError::Validation),
                };
                match ma_type {
                    Ok(ma_type) => state
                        .indicators
                        .ma(&symbol, request.params.period.unwrap_or(20), ma_type, limit)
                        .await
                        .map(|v| serde_json::to_value(v).unwrap_or_default()),
                    Err(e) => Err(e),
                }
            }
            "RSI" => state
                .indicators
                .rsi(&symbol, request.params.period.unwrap_or(14), limit)
                .await
                .map(|v| serde_json::to_value(v).unwrap_or_default()),
            "MACD" => state
                .indicators
                .macd(
                    &symbol,
                    request.params.fast.unwrap_or(12),
                    request.params.slow.unwrap_or(26),
                    request.params.signal.unwrap_or(9),
                    limit,
                )
                .await
                .map(|v| serde_json::to_value(v).unwrap_or_default()),
            "BB" => state
                .indicators
                .bollinger(
                    &symbol,
                    request.params.period.unwrap_or(20),
                    request.params.stddev.unwrap_or(2.0),
                    limit,
                )
                .await
                .map(|v| serde_json::to_value(v).unwrap_or_default()),
            "KDJ" => state
                .indicators
                .kdj(&symbol, request.params.period.unwrap_or(9), limit)
                .await
                .map(|v| serde_json::to_value(v).unwrap_or_default()),
            other => Err(AppError::Validation(format!("unknown indicator: {}", other))),
        };

        match result {
            Ok(values) => {
                data.insert(name.clone(), values);
            }
            Err(e) => {
                errors.insert(name.clone(), json!(e.to_string()));
            }
        }
    }

    let mut body = json!({
        "success": true,
        "symbol": symbol.code(),
        "data": data,
    });
    if !errors.is_empty() {
        body["errors"] = serde_json::Value::Object(errors);
    }
    Ok(Json(body))
}

/// DELETE /indicators/{symbol}/cache
pub async fn clear_cache(
    Path(symbol): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let symbol = parse_symbol(&symbol)?;
    let dropped = state.indicators.clear(&symbol).await?;
    Ok(Json(json!({
        "success": true,
        "cleared": dropped,
    })))
}

fn limit_or_default(limit: Option<usize>) -> usize {
    match limit {
        Some(limit) if limit > 0 => limit.min(10_000),
        _ => DEFAULT_LIMIT,
    }
}
