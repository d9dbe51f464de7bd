//! Typed rule conditions.
//!
//! Indicator and signal identifiers are closed enumerations. A condition that
//! names an unknown identifier, or pairs a signal with an indicator it does
//! not belong to, fails to deserialize. The catalogue also names signals that
//! have no evaluator yet; those parse and always evaluate to false.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::error::SigtraderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }

    /// Signed quantity contribution to a net position.
    pub fn signed(self, qty: f64) -> f64 {
        match self {
            Side::Buy => qty,
            Side::Sell => -qty,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = SigtraderError;

    /// Case-insensitive, so ledger rows written as `buy` still parse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" => Ok(Side::Buy),
            "SELL" => Ok(Side::Sell),
            _ => Err(SigtraderError::RuleInvalid {
                reason: format!("unknown side '{s}'"),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Logic {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IndicatorType {
    Macd,
    Kdj,
    Boll,
    Rsi,
    Bbi,
    Cci,
    Ma,
    Candle,
}

impl IndicatorType {
    pub fn as_str(self) -> &'static str {
        match self {
            IndicatorType::Macd => "MACD",
            IndicatorType::Kdj => "KDJ",
            IndicatorType::Boll => "BOLL",
            IndicatorType::Rsi => "RSI",
            IndicatorType::Bbi => "BBI",
            IndicatorType::Cci => "CCI",
            IndicatorType::Ma => "MA",
            IndicatorType::Candle => "CANDLE",
        }
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

macro_rules! signal_types {
    ($($variant:ident => ($name:literal, $indicator:ident)),+ $(,)?) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "&'static str")]
        pub enum SignalType {
            $($variant),+
        }

        impl SignalType {
            pub const ALL: &'static [SignalType] = &[$(SignalType::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(SignalType::$variant => $name),+
                }
            }

            /// The indicator family this signal belongs to.
            pub fn indicator(self) -> IndicatorType {
                match self {
                    $(SignalType::$variant => IndicatorType::$indicator),+
                }
            }
        }
    };
}

signal_types! {
    MacdGoldenCross => ("MACD_GOLDEN_CROSS", Macd),
    MacdDeadCross => ("MACD_DEAD_CROSS", Macd),
    MacdAboveZero => ("MACD_ABOVE_ZERO", Macd),
    MacdBelowZero => ("MACD_BELOW_ZERO", Macd),
    MacdBullishArrange => ("MACD_BULLISH_ARRANGE", Macd),
    MacdBearishArrange => ("MACD_BEARISH_ARRANGE", Macd),
    MacdDoubleGolden => ("MACD_DOUBLE_GOLDEN", Macd),
    MacdLowGolden => ("MACD_LOW_GOLDEN", Macd),
    MacdBottomDivergence => ("MACD_BOTTOM_DIVERGENCE", Macd),
    MacdTopDivergence => ("MACD_TOP_DIVERGENCE", Macd),

    RsiOversold => ("RSI_OVERSOLD", Rsi),
    RsiOverbought => ("RSI_OVERBOUGHT", Rsi),
    RsiCross30Up => ("RSI_CROSS_30_UP", Rsi),
    RsiCross70Down => ("RSI_CROSS_70_DOWN", Rsi),
    RsiGoldenCross => ("RSI_GOLDEN_CROSS", Rsi),
    RsiDeadCross => ("RSI_DEAD_CROSS", Rsi),
    RsiTurnUp => ("RSI_TURN_UP", Rsi),
    RsiTurnDown => ("RSI_TURN_DOWN", Rsi),
    RsiLowGolden => ("RSI_LOW_GOLDEN", Rsi),

    KdjGoldenCross => ("KDJ_GOLDEN_CROSS", Kdj),
    KdjDeadCross => ("KDJ_DEAD_CROSS", Kdj),
    KdjOversold => ("KDJ_OVERSOLD", Kdj),
    KdjOverbought => ("KDJ_OVERBOUGHT", Kdj),
    KdjBottomDivergence => ("KDJ_BOTTOM_DIVERGENCE", Kdj),
    KdjTopDivergence => ("KDJ_TOP_DIVERGENCE", Kdj),
    KdjTurnUp => ("KDJ_TURN_UP", Kdj),
    KdjTurnDown => ("KDJ_TURN_DOWN", Kdj),
    KdjBullishArrange => ("KDJ_BULLISH_ARRANGE", Kdj),
    KdjBearishArrange => ("KDJ_BEARISH_ARRANGE", Kdj),
    KdjLowGolden => ("KDJ_LOW_GOLDEN", Kdj),

    BollOpenExpand => ("BOLL_OPEN_EXPAND", Boll),
    BollOpenShrink => ("BOLL_OPEN_SHRINK", Boll),
    BollBreakUpper => ("BOLL_BREAK_UPPER", Boll),
    BollBreakLower => ("BOLL_BREAK_LOWER", Boll),
    BollBreakMiddle => ("BOLL_BREAK_MIDDLE", Boll),
    BollBreakMiddleDown => ("BOLL_BREAK_MIDDLE_DOWN", Boll),
    BollBreakUpperDown => ("BOLL_BREAK_UPPER_DOWN", Boll),
    BollBreakLowerDown => ("BOLL_BREAK_LOWER_DOWN", Boll),

    BbiPriceCrossUp => ("BBI_PRICE_CROSS_UP", Bbi),
    BbiPriceCrossDown => ("BBI_PRICE_CROSS_DOWN", Bbi),

    CciBelowNeg100 => ("CCI_BELOW_NEG100", Cci),
    CciAbove100 => ("CCI_ABOVE_100", Cci),

    MaPriceAboveMa5 => ("MA_PRICE_ABOVE_MA5", Ma),
    MaPriceAboveMa10 => ("MA_PRICE_ABOVE_MA10", Ma),
    MaPriceAboveMa20 => ("MA_PRICE_ABOVE_MA20", Ma),
    MaPriceAboveMa30 => ("MA_PRICE_ABOVE_MA30", Ma),
    MaPriceAboveMa60 => ("MA_PRICE_ABOVE_MA60", Ma),
    MaPriceBelowMa5 => ("MA_PRICE_BELOW_MA5", Ma),
    MaPriceBelowMa10 => ("MA_PRICE_BELOW_MA10", Ma),
    MaPriceBelowMa20 => ("MA_PRICE_BELOW_MA20", Ma),
    MaPriceBelowMa30 => ("MA_PRICE_BELOW_MA30", Ma),
    MaPriceBelowMa60 => ("MA_PRICE_BELOW_MA60", Ma),
    MaMa5CrossMa10 => ("MA_MA5_CROSS_MA10", Ma),
    MaMa5CrossMa20 => ("MA_MA5_CROSS_MA20", Ma),
    MaMa5CrossMa30 => ("MA_MA5_CROSS_MA30", Ma),
    MaMa3CrossMa15 => ("MA_MA3_CROSS_MA15", Ma),
    MaMa5DeadCrossMa10 => ("MA_MA5_DEAD_CROSS_MA10", Ma),
    MaMa5DeadCrossMa20 => ("MA_MA5_DEAD_CROSS_MA20", Ma),
    MaMa5DeadCrossMa30 => ("MA_MA5_DEAD_CROSS_MA30", Ma),
    MaMa3DeadCrossMa15 => ("MA_MA3_DEAD_CROSS_MA15", Ma),
    MaBullishArrange => ("MA_BULLISH_ARRANGE_5_10_20", Ma),
    MaBearishArrange => ("MA_BEARISH_ARRANGE_5_10_20", Ma),

    CandleBarefootBearish => ("CANDLE_BAREFOOT_BEARISH", Candle),
    CandleBarefootBullish => ("CANDLE_BAREFOOT_BULLISH", Candle),
    CandleBaldBearish => ("CANDLE_BALD_BEARISH", Candle),
    CandleBaldBullish => ("CANDLE_BALD_BULLISH", Candle),
    CandleDoji => ("CANDLE_DOJI", Candle),
    CandleBigYang => ("CANDLE_BIG_YANG", Candle),
    CandleBigYin => ("CANDLE_BIG_YIN", Candle),
    CandleLongUpperShadow => ("CANDLE_LONG_UPPER_SHADOW", Candle),
    CandleBullishEngulfing => ("CANDLE_BULLISH_ENGULFING", Candle),
    CandleBearishEngulfing => ("CANDLE_BEARISH_ENGULFING", Candle),
    CandleShootingStar => ("CANDLE_SHOOTING_STAR", Candle),
    CandleMorningStar => ("CANDLE_MORNING_STAR", Candle),
    CandleEveningStar => ("CANDLE_EVENING_STAR", Candle),
    CandleThreeRedSoldiers => ("CANDLE_THREE_RED_SOLDIERS", Candle),
    CandleFourCrows => ("CANDLE_FOUR_CROWS", Candle),
}

impl SignalType {
    /// Signals that compare bar i against bar i-1 and so can never fire at
    /// the first bar.
    pub fn reads_previous_bar(self) -> bool {
        use SignalType::*;
        matches!(
            self,
            MacdGoldenCross
                | MacdDeadCross
                | RsiCross30Up
                | RsiCross70Down
                | KdjGoldenCross
                | KdjDeadCross
                | BollOpenExpand
                | BollOpenShrink
                | BollBreakUpper
                | BollBreakLower
                | BollBreakMiddle
                | BollBreakMiddleDown
                | BbiPriceCrossUp
                | BbiPriceCrossDown
                | MaMa5CrossMa10
                | MaMa5CrossMa20
                | MaMa5CrossMa30
                | MaMa3CrossMa15
                | MaMa5DeadCrossMa10
                | MaMa5DeadCrossMa20
                | MaMa5DeadCrossMa30
                | MaMa3DeadCrossMa15
                | CandleBullishEngulfing
                | CandleBearishEngulfing
        )
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalType {
    type Err = SigtraderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SignalType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| SigtraderError::RuleInvalid {
                reason: format!("unknown signal type '{s}'"),
            })
    }
}

impl TryFrom<String> for SignalType {
    type Error = SigtraderError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<SignalType> for &'static str {
    fn from(t: SignalType) -> Self {
        t.as_str()
    }
}

/// Per-condition overrides. Keys other than these are ignored on input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,
}

impl SignalParams {
    pub fn threshold_or(&self, default: f64) -> f64 {
        self.threshold.unwrap_or(default)
    }

    pub fn tolerance_or(&self, default: f64) -> f64 {
        self.tolerance.unwrap_or(default)
    }

    fn validate(&self) -> Result<(), SigtraderError> {
        if let Some(t) = self.threshold
            && !t.is_finite()
        {
            return Err(SigtraderError::RuleInvalid {
                reason: format!("threshold must be finite, got {t}"),
            });
        }
        if let Some(t) = self.tolerance
            && (!t.is_finite() || t < 0.0)
        {
            return Err(SigtraderError::RuleInvalid {
                reason: format!("tolerance must be a non-negative number, got {t}"),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCondition")]
pub struct Condition {
    pub side: Side,
    pub indicator_type: IndicatorType,
    pub signal_type: SignalType,
    #[serde(default)]
    pub params: SignalParams,
}

#[derive(Deserialize)]
struct RawCondition {
    side: Side,
    indicator_type: IndicatorType,
    signal_type: SignalType,
    #[serde(default)]
    params: Option<SignalParams>,
}

impl Condition {
    /// Build a condition, rejecting signals that do not belong to `indicator_type`.
    pub fn new(
        side: Side,
        indicator_type: IndicatorType,
        signal_type: SignalType,
        params: SignalParams,
    ) -> Result<Self, SigtraderError> {
        if signal_type.indicator() != indicator_type {
            return Err(SigtraderError::RuleInvalid {
                reason: format!(
                    "signal {signal_type} belongs to {}, not {indicator_type}",
                    signal_type.indicator()
                ),
            });
        }
        params.validate()?;
        Ok(Self {
            side,
            indicator_type,
            signal_type,
            params,
        })
    }
}

impl TryFrom<RawCondition> for Condition {
    type Error = SigtraderError;

    fn try_from(raw: RawCondition) -> Result<Self, Self::Error> {
        Condition::new(
            raw.side,
            raw.indicator_type,
            raw.signal_type,
            raw.params.unwrap_or_default(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionGroup {
    pub logic: Logic,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_names_round_trip_through_from_str() {
        for &signal in SignalType::ALL {
            assert_eq!(signal.as_str().parse::<SignalType>().unwrap(), signal);
        }
    }

    #[test]
    fn signal_names_are_prefixed_by_their_indicator() {
        for &signal in SignalType::ALL {
            assert!(
                signal.as_str().starts_with(signal.indicator().as_str()),
                "{signal} not under {}",
                signal.indicator()
            );
        }
    }

    #[test]
    fn unknown_signal_rejected() {
        let err = "MACD_SIDEWAYS".parse::<SignalType>().unwrap_err();
        assert!(matches!(err, SigtraderError::RuleInvalid { .. }));
    }

    #[test]
    fn side_parse_is_case_insensitive() {
        assert_eq!("buy".parse::<Side>().unwrap(), Side::Buy);
        assert_eq!("SELL".parse::<Side>().unwrap(), Side::Sell);
        assert!("hold".parse::<Side>().is_err());
    }

    #[test]
    fn deserialize_condition() {
        let json = r#"{"side":"BUY","indicator_type":"RSI","signal_type":"RSI_OVERSOLD",
                       "params":{"threshold":25,"period":14}}"#;
        let cond: Condition = serde_json::from_str(json).unwrap();
        assert_eq!(cond.side, Side::Buy);
        assert_eq!(cond.signal_type, SignalType::RsiOversold);
        assert_eq!(cond.params.threshold, Some(25.0));
        assert_eq!(cond.params.tolerance, None);
    }

    #[test]
    fn deserialize_condition_without_params() {
        let json = r#"{"side":"SELL","indicator_type":"MACD","signal_type":"MACD_DEAD_CROSS"}"#;
        let cond: Condition = serde_json::from_str(json).unwrap();
        assert_eq!(cond.params, SignalParams::default());
    }

    #[test]
    fn null_params_use_defaults() {
        let json =
            r#"{"side":"SELL","indicator_type":"MACD","signal_type":"MACD_DEAD_CROSS","params":null}"#;
        let cond: Condition = serde_json::from_str(json).unwrap();
        assert_eq!(cond.params, SignalParams::default());
    }

    #[test]
    fn mismatched_indicator_rejected() {
        let json = r#"{"side":"BUY","indicator_type":"KDJ","signal_type":"RSI_OVERSOLD"}"#;
        let err = serde_json::from_str::<Condition>(json).unwrap_err();
        assert!(err.to_string().contains("belongs to RSI"));
    }

    #[test]
    fn unknown_indicator_rejected() {
        let json = r#"{"side":"BUY","indicator_type":"ICHIMOKU","signal_type":"RSI_OVERSOLD"}"#;
        assert!(serde_json::from_str::<Condition>(json).is_err());
    }

    #[test]
    fn negative_tolerance_rejected() {
        let err = Condition::new(
            Side::Buy,
            IndicatorType::Candle,
            SignalType::CandleDoji,
            SignalParams {
                threshold: None,
                tolerance: Some(-0.1),
            },
        )
        .unwrap_err();
        assert!(matches!(err, SigtraderError::RuleInvalid { .. }));
    }

    #[test]
    fn serialize_uses_wire_names() {
        let cond = Condition::new(
            Side::Sell,
            IndicatorType::Boll,
            SignalType::BollBreakUpper,
            SignalParams::default(),
        )
        .unwrap();
        let json = serde_json::to_value(&cond).unwrap();
        assert_eq!(json["side"], "SELL");
        assert_eq!(json["indicator_type"], "BOLL");
        assert_eq!(json["signal_type"], "BOLL_BREAK_UPPER");
        assert_eq!(json["params"], serde_json::json!({}));
    }
}
