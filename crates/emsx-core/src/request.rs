//! GroupRouteEx request payload
//!
//! [`GroupRouteRequest`] is the typed form of the one request the client
//! submits. [`GroupRouteRequest::to_request`] renders it onto a generic
//! [`Request`] created from the opened service.
//!
//! Strategy parameters are positional: the broker's strategy definition fixes
//! the order of fields, and each position carries an indicator (0 = use the
//! paired value, 1 = ignore it). [`StrategyParams`] keeps the pairs in
//! declaration order and writes the two parallel arrays from that single list,
//! so they cannot drift out of alignment.
//!
//! ```rust
//! use emsx_core::request::{StrategyField, StrategyParams};
//!
//! let vwap = StrategyParams::new("VWAP")
//!     .value("09:30:00")
//!     .value("10:30:00")
//!     .ignored();
//!
//! assert_eq!(vwap.indicators(), vec![0, 0, 1]);
//! assert_eq!(vwap.fields()[2], StrategyField::Ignored);
//! ```

use crate::error::{EmsxError, EmsxResult};
use crate::message::{Element, Fields};
use crate::transport::{Request, Service};

/// Operation name on the EMSX service
pub const GROUP_ROUTE_OPERATION: &str = "GroupRouteEx";

/// Schema element names
pub mod fields {
    pub const EMSX_SEQUENCE: &str = "EMSX_SEQUENCE";
    pub const EMSX_AMOUNT_PERCENT: &str = "EMSX_AMOUNT_PERCENT";
    pub const EMSX_BROKER: &str = "EMSX_BROKER";
    pub const EMSX_HAND_INSTRUCTION: &str = "EMSX_HAND_INSTRUCTION";
    pub const EMSX_ORDER_TYPE: &str = "EMSX_ORDER_TYPE";
    pub const EMSX_TICKER: &str = "EMSX_TICKER";
    pub const EMSX_TIF: &str = "EMSX_TIF";
    pub const EMSX_ACCOUNT: &str = "EMSX_ACCOUNT";
    pub const EMSX_BOOKNAME: &str = "EMSX_BOOKNAME";
    pub const EMSX_EXEC_INSTRUCTIONS: &str = "EMSX_EXEC_INSTRUCTIONS";
    pub const EMSX_GTD_DATE: &str = "EMSX_GTD_DATE";
    pub const EMSX_LIMIT_PRICE: &str = "EMSX_LIMIT_PRICE";
    pub const EMSX_STOP_PRICE: &str = "EMSX_STOP_PRICE";
    pub const EMSX_NOTES: &str = "EMSX_NOTES";
    pub const EMSX_TRADER_UUID: &str = "EMSX_TRADER_UUID";
    pub const EMSX_REQUEST_TYPE: &str = "EMSX_REQUEST_TYPE";
    pub const MULTILEG: &str = "Multileg";
    pub const EMSX_AMOUNT: &str = "EMSX_AMOUNT";
    pub const EMSX_ML_RATIO: &str = "EMSX_ML_RATIO";
    pub const EMSX_ROUTE_REF_ID_PAIRS: &str = "EMSX_ROUTE_REF_ID_PAIRS";
    pub const EMSX_ROUTE_REF_ID: &str = "EMSX_ROUTE_REF_ID";
    pub const EMSX_STRATEGY_PARAMS: &str = "EMSX_STRATEGY_PARAMS";
    pub const EMSX_STRATEGY_NAME: &str = "EMSX_STRATEGY_NAME";
    pub const EMSX_STRATEGY_FIELD_INDICATORS: &str = "EMSX_STRATEGY_FIELD_INDICATORS";
    pub const EMSX_FIELD_INDICATOR: &str = "EMSX_FIELD_INDICATOR";
    pub const EMSX_STRATEGY_FIELDS: &str = "EMSX_STRATEGY_FIELDS";
    pub const EMSX_FIELD_DATA: &str = "EMSX_FIELD_DATA";
}

/// Indicator for a strategy field whose value is honoured
pub const INDICATOR_VALUE: i32 = 0;
/// Indicator for a positional placeholder whose value is ignored
pub const INDICATOR_IGNORED: i32 = 1;

/// One positional strategy parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyField {
    Value(String),
    Ignored,
}

impl StrategyField {
    pub fn indicator(&self) -> i32 {
        match self {
            StrategyField::Value(_) => INDICATOR_VALUE,
            StrategyField::Ignored => INDICATOR_IGNORED,
        }
    }

    /// The data entry written for this position
    pub fn data(&self) -> &str {
        match self {
            StrategyField::Value(v) => v,
            StrategyField::Ignored => "",
        }
    }
}

/// Execution strategy shared by every order in the group route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyParams {
    name: String,
    fields: Vec<StrategyField>,
}

impl StrategyParams {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Next positional field, carrying a value
    pub fn value(mut self, data: impl Into<String>) -> Self {
        self.fields.push(StrategyField::Value(data.into()));
        self
    }

    /// Next positional field, left as a placeholder
    pub fn ignored(mut self) -> Self {
        self.fields.push(StrategyField::Ignored);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[StrategyField] {
        &self.fields
    }

    pub fn indicators(&self) -> Vec<i32> {
        self.fields.iter().map(StrategyField::indicator).collect()
    }

    /// Values that take effect, in position order
    pub fn effective_values(&self) -> Vec<(usize, &str)> {
        self.fields
            .iter()
            .enumerate()
            .filter_map(|(pos, field)| match field {
                StrategyField::Value(v) => Some((pos, v.as_str())),
                StrategyField::Ignored => None,
            })
            .collect()
    }

    /// VWAP between 09:30 and 10:30 with every optional parameter left out
    pub fn vwap_morning() -> Self {
        let mut params = Self::new("VWAP").value("09:30:00").value("10:30:00");
        // Max%Volume, %AMSession, OPG, MOC, CompletePX, TriggerPX,
        // DarkComplete, DarkCompPX, RefIndex, Discretion
        for _ in 0..10 {
            params = params.ignored();
        }
        params
    }

    fn write_into(&self, strategy: &mut Fields) -> EmsxResult<()> {
        strategy.set(fields::EMSX_STRATEGY_NAME, self.name.as_str());
        // Both arrays exist even when there are no parameters
        strategy.set(fields::EMSX_STRATEGY_FIELD_INDICATORS, Element::Array(Vec::new()));
        strategy.set(fields::EMSX_STRATEGY_FIELDS, Element::Array(Vec::new()));

        for field in &self.fields {
            strategy
                .append_sequence(fields::EMSX_STRATEGY_FIELDS)?
                .set(fields::EMSX_FIELD_DATA, field.data());
            strategy
                .append_sequence(fields::EMSX_STRATEGY_FIELD_INDICATORS)?
                .set(fields::EMSX_FIELD_INDICATOR, field.indicator());
        }
        Ok(())
    }

    /// Read strategy parameters back out of an `EMSX_STRATEGY_PARAMS` sequence
    pub fn from_element(element: &Element) -> EmsxResult<Self> {
        let strategy = element
            .as_sequence()
            .ok_or_else(|| EmsxError::invalid_conversion(fields::EMSX_STRATEGY_PARAMS, "sequence"))?;
        let name = strategy.get_as_string(fields::EMSX_STRATEGY_NAME)?;
        let indicators = strategy.element(fields::EMSX_STRATEGY_FIELD_INDICATORS)?;
        let data = strategy.element(fields::EMSX_STRATEGY_FIELDS)?;

        let count = indicators.num_values();
        if data.num_values() != count {
            return Err(EmsxError::invalid_request(format!(
                "{} has {} entries but {} has {}",
                fields::EMSX_STRATEGY_FIELD_INDICATORS,
                count,
                fields::EMSX_STRATEGY_FIELDS,
                data.num_values()
            )));
        }

        let mut params = Self::new(name);
        for pos in 0..count {
            let indicator = indicators
                .get_value_as_sequence(fields::EMSX_STRATEGY_FIELD_INDICATORS, pos)?
                .get_as_i32(fields::EMSX_FIELD_INDICATOR)?;
            let value = data
                .get_value_as_sequence(fields::EMSX_STRATEGY_FIELDS, pos)?
                .get_as_string(fields::EMSX_FIELD_DATA)?;
            params = match indicator {
                INDICATOR_VALUE => params.value(value),
                INDICATOR_IGNORED => params.ignored(),
                other => {
                    return Err(EmsxError::invalid_request(format!(
                        "strategy field {} has indicator {}",
                        pos, other
                    )))
                }
            };
        }
        Ok(params)
    }
}

/// Reference id to attach to the route created for one order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRefIdPair {
    pub route_ref_id: String,
    pub sequence: i32,
}

impl RouteRefIdPair {
    pub fn new(route_ref_id: impl Into<String>, sequence: i32) -> Self {
        Self {
            route_ref_id: route_ref_id.into(),
            sequence,
        }
    }
}

/// Request type choice. Multileg is only valid for options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestType {
    Multileg { amount: i32, ratios: Vec<i32> },
}

/// Optional route fields, written only when set
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptionalRouteFields {
    pub account: Option<String>,
    pub book_name: Option<String>,
    pub exec_instructions: Option<String>,
    pub gtd_date: Option<String>,
    pub limit_price: Option<f64>,
    pub stop_price: Option<f64>,
    pub notes: Option<String>,
    pub trader_uuid: Option<i32>,
}

impl OptionalRouteFields {
    fn write_into(&self, request: &mut Fields) {
        if let Some(v) = &self.account {
            request.set(fields::EMSX_ACCOUNT, v.as_str());
        }
        if let Some(v) = &self.book_name {
            request.set(fields::EMSX_BOOKNAME, v.as_str());
        }
        if let Some(v) = &self.exec_instructions {
            request.set(fields::EMSX_EXEC_INSTRUCTIONS, v.as_str());
        }
        if let Some(v) = &self.gtd_date {
            request.set(fields::EMSX_GTD_DATE, v.as_str());
        }
        if let Some(v) = self.limit_price {
            request.set(fields::EMSX_LIMIT_PRICE, v);
        }
        if let Some(v) = self.stop_price {
            request.set(fields::EMSX_STOP_PRICE, v);
        }
        if let Some(v) = &self.notes {
            request.set(fields::EMSX_NOTES, v.as_str());
        }
        if let Some(v) = self.trader_uuid {
            request.set(fields::EMSX_TRADER_UUID, v);
        }
    }
}

/// Route several existing orders to one broker under one strategy
#[derive(Debug, Clone, PartialEq)]
pub struct GroupRouteRequest {
    pub sequences: Vec<i32>,
    /// Percentage of each order's amount to route
    pub amount_percent: i32,
    pub broker: String,
    // Taken from the original order when the route is created, but required
    pub hand_instruction: String,
    pub order_type: String,
    pub ticker: String,
    pub tif: String,
    pub optional: OptionalRouteFields,
    pub request_type: Option<RequestType>,
    pub route_ref_id_pairs: Vec<RouteRefIdPair>,
    pub strategy: Option<StrategyParams>,
}

impl GroupRouteRequest {
    /// The request this client submits: three IBM orders routed in full to
    /// BMTB under a morning VWAP
    pub fn scenario() -> Self {
        Self {
            sequences: vec![3734835, 3734836, 3734837],
            amount_percent: 100,
            broker: "BMTB".to_string(),
            hand_instruction: "ANY".to_string(),
            order_type: "MKT".to_string(),
            ticker: "IBM US Equity".to_string(),
            tif: "DAY".to_string(),
            optional: OptionalRouteFields::default(),
            request_type: None,
            route_ref_id_pairs: vec![
                RouteRefIdPair::new("MyRouteRef1", 3663920),
                RouteRefIdPair::new("MyRouteRef2", 3663921),
                RouteRefIdPair::new("MyRouteRef3", 3663922),
            ],
            strategy: Some(StrategyParams::vwap_morning()),
        }
    }

    pub fn validate(&self) -> EmsxResult<()> {
        if self.sequences.is_empty() {
            return Err(EmsxError::invalid_request("at least one order sequence is required"));
        }
        if !(1..=100).contains(&self.amount_percent) {
            return Err(EmsxError::invalid_request(format!(
                "amount percent {} is outside 1..=100",
                self.amount_percent
            )));
        }
        if self.broker.is_empty() {
            return Err(EmsxError::invalid_request("broker is required"));
        }
        Ok(())
    }

    /// Build the wire request on `service`
    pub fn to_request(&self, service: &Service) -> EmsxResult<Request> {
        self.validate()?;
        let mut request = service.create_request(GROUP_ROUTE_OPERATION)?;
        let root = request.fields_mut();

        for seq in &self.sequences {
            root.append(fields::EMSX_SEQUENCE, *seq)?;
        }

        root.set(fields::EMSX_AMOUNT_PERCENT, self.amount_percent)
            .set(fields::EMSX_BROKER, self.broker.as_str())
            .set(fields::EMSX_HAND_INSTRUCTION, self.hand_instruction.as_str())
            .set(fields::EMSX_ORDER_TYPE, self.order_type.as_str())
            .set(fields::EMSX_TICKER, self.ticker.as_str())
            .set(fields::EMSX_TIF, self.tif.as_str());

        self.optional.write_into(root);

        if let Some(RequestType::Multileg { amount, ratios }) = &self.request_type {
            let multileg = root
                .sequence_mut(fields::EMSX_REQUEST_TYPE)?
                .sequence_mut(fields::MULTILEG)?;
            multileg.set(fields::EMSX_AMOUNT, *amount);
            for ratio in ratios {
                multileg.append(fields::EMSX_ML_RATIO, *ratio)?;
            }
        }

        for pair in &self.route_ref_id_pairs {
            root.append_sequence(fields::EMSX_ROUTE_REF_ID_PAIRS)?
                .set(fields::EMSX_ROUTE_REF_ID, pair.route_ref_id.as_str())
                .set(fields::EMSX_SEQUENCE, pair.sequence);
        }

        if let Some(strategy) = &self.strategy {
            strategy.write_into(root.sequence_mut(fields::EMSX_STRATEGY_PARAMS)?)?;
        }

        Ok(request)
    }
}
