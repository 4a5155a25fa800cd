//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client (malformed headers or parameters).
    BadRequest(String),
    /// Engine error.
    Domain(DomainError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Domain(err) => domain_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn domain_error_to_response(err: DomainError) -> (StatusCode, String) {
    match &err {
        DomainError::OrderNotFound(_)
        | DomainError::StockUnitNotFound(_)
        | DomainError::LineItemNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        DomainError::InvalidQuantity(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        DomainError::SerialCodeTaken(_)
        | DomainError::InsufficientStock { .. }
        | DomainError::InvalidStatusTransition { .. }
        | DomainError::OrderClosed(_, _)
        | DomainError::UnitInUse(_) => (StatusCode::CONFLICT, err.to_string()),
        DomainError::Forbidden(_) => (StatusCode::FORBIDDEN, err.to_string()),
        DomainError::Store(store_err) => {
            tracing::error!(error = %store_err, "store error");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{OrderId, StockUnitId};
    use rust_decimal::Decimal;
    use stock_store::OrderStatus;

    fn status_of(err: DomainError) -> StatusCode {
        ApiError::Domain(err).into_response().status()
    }

    #[test]
    fn not_found_maps_to_404() {
        assert_eq!(
            status_of(DomainError::OrderNotFound(OrderId::from_i64(1))),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(DomainError::StockUnitNotFound(StockUnitId::from_i64(1))),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn precondition_failures_map_to_409() {
        assert_eq!(
            status_of(DomainError::InsufficientStock {
                serial_code: "SR-1".to_string(),
                available: Decimal::from(1),
                requested: Decimal::from(2),
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(DomainError::InvalidStatusTransition {
                from: OrderStatus::Delivered,
                to: OrderStatus::Approved,
            }),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn bad_input_maps_to_400() {
        assert_eq!(
            status_of(DomainError::InvalidQuantity(Decimal::ZERO)),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn forbidden_maps_to_403() {
        assert_eq!(
            status_of(DomainError::Forbidden(OrderId::from_i64(1))),
            StatusCode::FORBIDDEN
        );
    }
}
