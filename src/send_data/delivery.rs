//! Per-response delivery state.
//!
//! ```text
//! Pending ──finalize_headers──▶ Hijacked ──close──▶ Closed
//!    │                                                ▲
//!    └──────finalize_headers──▶ Normal ───close───────┘
//! ```

use axum::http::{HeaderMap, StatusCode};

use crate::send_data::error::SendDataError;
use crate::send_data::instruction::SendInstruction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    /// Upstream's headers have not been inspected yet.
    Pending,
    /// The proxy produces the body; upstream's body is discarded.
    Hijacked,
    /// Upstream's body goes to the client untouched.
    Normal,
    Closed,
}

impl DeliveryState {
    fn name(self) -> &'static str {
        match self {
            DeliveryState::Pending => "pending",
            DeliveryState::Hijacked => "hijacked",
            DeliveryState::Normal => "normal",
            DeliveryState::Closed => "closed",
        }
    }
}

/// Decision taken when upstream's headers are finalized.
#[derive(Debug, PartialEq, Eq)]
pub enum Delivery {
    Normal,
    Hijack(SendInstruction),
}

#[derive(Debug)]
pub struct ResponseDelivery {
    state: DeliveryState,
}

impl Default for ResponseDelivery {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseDelivery {
    pub fn new() -> Self {
        Self {
            state: DeliveryState::Pending,
        }
    }

    pub fn state(&self) -> DeliveryState {
        self.state
    }

    /// Inspect upstream's status and headers exactly once. Delivery headers
    /// are always stripped; only a `200` is hijacked.
    pub fn finalize_headers(
        &mut self,
        status: StatusCode,
        headers: &mut HeaderMap,
    ) -> Result<Delivery, SendDataError> {
        if self.state != DeliveryState::Pending {
            return Err(SendDataError::InvalidTransition(self.state.name()));
        }

        let instruction = SendInstruction::take_from(headers);
        let delivery = match instruction {
            Ok(Some(instruction)) if status == StatusCode::OK => Delivery::Hijack(instruction),
            Ok(_) => Delivery::Normal,
            Err(e) if status == StatusCode::OK => {
                self.state = DeliveryState::Closed;
                return Err(e);
            }
            Err(_) => Delivery::Normal,
        };

        self.state = match delivery {
            Delivery::Hijack(_) => DeliveryState::Hijacked,
            Delivery::Normal => DeliveryState::Normal,
        };
        Ok(delivery)
    }

    pub fn close(&mut self) {
        self.state = DeliveryState::Closed;
    }
}
