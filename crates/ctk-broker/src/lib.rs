//! ctk-broker
//!
//! Real-exchange connectivity is out of scope (spec §1 Non-goals); this
//! crate defines only the connector trait a "live" (non-paper) engine
//! variant would drive, plus [`StubConnector`], which returns
//! [`ConnectorError::NotImplemented`] for every call. No exchange-specific
//! wire protocol is implemented here — this draws the same kind of line
//! other external-integration boundaries in this codebase do: "the trait
//! this system depends on" stays narrow and typed, while "any concrete
//! integration behind it" stays out of scope.

use async_trait::async_trait;
use ctk_portfolio::{Micros, Qty};
use ctk_schemas::Side;

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectorError {
    NotImplemented,
}

impl std::fmt::Display for ConnectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectorError::NotImplemented => {
                write!(f, "this connector does not implement real-exchange connectivity")
            }
        }
    }
}

impl std::error::Error for ConnectorError {}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub qty: Qty,
    pub limit_price: Option<Micros>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
    pub broker_order_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccountInfo {
    pub cash: Micros,
    pub equity: Micros,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrokerPosition {
    pub symbol: String,
    pub side: Side,
    pub qty: Qty,
}

/// What a live (non-paper) engine variant would drive to reach a real
/// exchange. The simulation engine in `ctk-engine` never calls this trait —
/// it talks to `ctk-db`/`ctk-portfolio` directly — this exists purely as
/// the documented seam where that variant would plug in.
#[async_trait]
pub trait Connector: Send + Sync {
    fn name(&self) -> &'static str;

    async fn submit_order(&self, req: OrderRequest) -> Result<OrderAck, ConnectorError>;

    async fn cancel_order(&self, broker_order_id: &str) -> Result<(), ConnectorError>;

    async fn fetch_account(&self) -> Result<AccountInfo, ConnectorError>;

    async fn fetch_positions(&self) -> Result<Vec<BrokerPosition>, ConnectorError>;
}

/// The only [`Connector`] this crate ships. Every call returns
/// [`ConnectorError::NotImplemented`].
#[derive(Debug, Default, Clone, Copy)]
pub struct StubConnector;

#[async_trait]
impl Connector for StubConnector {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn submit_order(&self, _req: OrderRequest) -> Result<OrderAck, ConnectorError> {
        Err(ConnectorError::NotImplemented)
    }

    async fn cancel_order(&self, _broker_order_id: &str) -> Result<(), ConnectorError> {
        Err(ConnectorError::NotImplemented)
    }

    async fn fetch_account(&self) -> Result<AccountInfo, ConnectorError> {
        Err(ConnectorError::NotImplemented)
    }

    async fn fetch_positions(&self) -> Result<Vec<BrokerPosition>, ConnectorError> {
        Err(ConnectorError::NotImplemented)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_connector_never_implements_anything() {
        let c = StubConnector;
        assert_eq!(c.name(), "stub");
        let req = OrderRequest {
            symbol: "BTC-USD".to_string(),
            side: Side::Long,
            qty: Qty::parse_decimal("1").unwrap(),
            limit_price: None,
        };
        assert_eq!(
            c.submit_order(req).await,
            Err(ConnectorError::NotImplemented)
        );
        assert_eq!(
            c.fetch_account().await,
            Err(ConnectorError::NotImplemented)
        );
        assert_eq!(
            c.fetch_positions().await,
            Err(ConnectorError::NotImplemented)
        );
        assert_eq!(
            c.cancel_order("abc").await,
            Err(ConnectorError::NotImplemented)
        );
    }
}
