//! Leaf condition evaluation.
//!
//! Dispatch is a lookup table keyed by `(IndicatorType, SignalType)`. Every
//! evaluator is total: out-of-range indices, absent column values and zero
//! denominators all resolve to `false`, as does a key with no entry.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::domain::bar::Bar;
use crate::domain::condition::{Condition, IndicatorType, SignalParams, SignalType};
use crate::domain::indicator::{Column, EnrichedFrame, MaWindow};

/// Evaluator signature: params, frame, bar index.
pub type SignalFn = fn(&SignalParams, &EnrichedFrame, usize) -> bool;

pub const DEFAULT_CANDLE_TOLERANCE: f64 = 0.0001;
const DOJI_BODY_RATIO: f64 = 0.1;
const BIG_BODY_RATIO: f64 = 0.7;
const LONG_SHADOW_MULTIPLE: f64 = 2.0;

static SIGNAL_TABLE: LazyLock<HashMap<(IndicatorType, SignalType), SignalFn>> =
    LazyLock::new(build_table);

/// Evaluate one condition at bar `idx`.
pub fn evaluate(condition: &Condition, frame: &EnrichedFrame, idx: usize) -> bool {
    if idx >= frame.len() {
        return false;
    }
    lookup(condition.indicator_type, condition.signal_type)
        .is_some_and(|f| f(&condition.params, frame, idx))
}

pub fn lookup(indicator: IndicatorType, signal: SignalType) -> Option<SignalFn> {
    SIGNAL_TABLE.get(&(indicator, signal)).copied()
}

/// Whether a signal has an evaluator registered under its own indicator.
pub fn is_implemented(signal: SignalType) -> bool {
    lookup(signal.indicator(), signal).is_some()
}

fn build_table() -> HashMap<(IndicatorType, SignalType), SignalFn> {
    use IndicatorType as I;
    use SignalType as S;

    let mut t: HashMap<(IndicatorType, SignalType), SignalFn> = HashMap::new();

    // MACD
    t.insert((I::Macd, S::MacdGoldenCross), |_, f, i| {
        crossed_above(f, Column::MacdLine, Column::MacdSignal, i)
    });
    t.insert((I::Macd, S::MacdDeadCross), |_, f, i| {
        crossed_below(f, Column::MacdLine, Column::MacdSignal, i)
    });
    t.insert((I::Macd, S::MacdAboveZero), |p, f, i| {
        above_level(f, Column::MacdLine, p.threshold_or(0.0), i)
    });
    t.insert((I::Macd, S::MacdBelowZero), |p, f, i| {
        below_level(f, Column::MacdLine, p.threshold_or(0.0), i)
    });

    // RSI
    t.insert((I::Rsi, S::RsiOversold), |p, f, i| {
        below_level(f, Column::Rsi, p.threshold_or(30.0), i)
    });
    t.insert((I::Rsi, S::RsiOverbought), |p, f, i| {
        above_level(f, Column::Rsi, p.threshold_or(70.0), i)
    });
    t.insert((I::Rsi, S::RsiCross30Up), |p, f, i| {
        crossed_above_level(f, Column::Rsi, p.threshold_or(30.0), i)
    });
    t.insert((I::Rsi, S::RsiCross70Down), |p, f, i| {
        crossed_below_level(f, Column::Rsi, p.threshold_or(70.0), i)
    });

    // KDJ
    t.insert((I::Kdj, S::KdjGoldenCross), |_, f, i| {
        crossed_above(f, Column::KdjK, Column::KdjD, i)
    });
    t.insert((I::Kdj, S::KdjDeadCross), |_, f, i| {
        crossed_below(f, Column::KdjK, Column::KdjD, i)
    });
    t.insert((I::Kdj, S::KdjOversold), |p, f, i| {
        below_level(f, Column::KdjJ, p.threshold_or(20.0), i)
    });
    t.insert((I::Kdj, S::KdjOverbought), |p, f, i| {
        above_level(f, Column::KdjJ, p.threshold_or(80.0), i)
    });

    // BOLL
    t.insert((I::Boll, S::BollBreakUpper), |_, f, i| {
        crossed_above(f, Column::Close, Column::BollUpper, i)
    });
    t.insert((I::Boll, S::BollBreakLower), |_, f, i| {
        crossed_below(f, Column::Close, Column::BollLower, i)
    });
    t.insert((I::Boll, S::BollBreakMiddle), |_, f, i| {
        crossed_above(f, Column::Close, Column::BollMiddle, i)
    });
    t.insert((I::Boll, S::BollBreakMiddleDown), |_, f, i| {
        crossed_below(f, Column::Close, Column::BollMiddle, i)
    });
    t.insert((I::Boll, S::BollOpenExpand), |_, f, i| {
        rising(f, Column::BollWidth, i)
    });
    t.insert((I::Boll, S::BollOpenShrink), |_, f, i| {
        falling(f, Column::BollWidth, i)
    });

    // BBI
    t.insert((I::Bbi, S::BbiPriceCrossUp), |_, f, i| {
        crossed_above(f, Column::Close, Column::Bbi, i)
    });
    t.insert((I::Bbi, S::BbiPriceCrossDown), |_, f, i| {
        crossed_below(f, Column::Close, Column::Bbi, i)
    });

    // CCI
    t.insert((I::Cci, S::CciBelowNeg100), |p, f, i| {
        below_level(f, Column::Cci, p.threshold_or(-100.0), i)
    });
    t.insert((I::Cci, S::CciAbove100), |p, f, i| {
        above_level(f, Column::Cci, p.threshold_or(100.0), i)
    });

    // MA: price against a single average
    t.insert((I::Ma, S::MaPriceAboveMa5), |_, f, i| close_above_ma(f, MaWindow::Ma5, i));
    t.insert((I::Ma, S::MaPriceAboveMa10), |_, f, i| close_above_ma(f, MaWindow::Ma10, i));
    t.insert((I::Ma, S::MaPriceAboveMa20), |_, f, i| close_above_ma(f, MaWindow::Ma20, i));
    t.insert((I::Ma, S::MaPriceAboveMa30), |_, f, i| close_above_ma(f, MaWindow::Ma30, i));
    t.insert((I::Ma, S::MaPriceAboveMa60), |_, f, i| close_above_ma(f, MaWindow::Ma60, i));
    t.insert((I::Ma, S::MaPriceBelowMa5), |_, f, i| close_below_ma(f, MaWindow::Ma5, i));
    t.insert((I::Ma, S::MaPriceBelowMa10), |_, f, i| close_below_ma(f, MaWindow::Ma10, i));
    t.insert((I::Ma, S::MaPriceBelowMa20), |_, f, i| close_below_ma(f, MaWindow::Ma20, i));
    t.insert((I::Ma, S::MaPriceBelowMa30), |_, f, i| close_below_ma(f, MaWindow::Ma30, i));
    t.insert((I::Ma, S::MaPriceBelowMa60), |_, f, i| close_below_ma(f, MaWindow::Ma60, i));

    // MA: average pairs
    t.insert((I::Ma, S::MaMa5CrossMa10), |_, f, i| {
        ma_golden(f, MaWindow::Ma5, MaWindow::Ma10, i)
    });
    t.insert((I::Ma, S::MaMa5CrossMa20), |_, f, i| {
        ma_golden(f, MaWindow::Ma5, MaWindow::Ma20, i)
    });
    t.insert((I::Ma, S::MaMa5CrossMa30), |_, f, i| {
        ma_golden(f, MaWindow::Ma5, MaWindow::Ma30, i)
    });
    t.insert((I::Ma, S::MaMa3CrossMa15), |_, f, i| {
        ma_golden(f, MaWindow::Ma3, MaWindow::Ma15, i)
    });
    t.insert((I::Ma, S::MaMa5DeadCrossMa10), |_, f, i| {
        ma_dead(f, MaWindow::Ma5, MaWindow::Ma10, i)
    });
    t.insert((I::Ma, S::MaMa5DeadCrossMa20), |_, f, i| {
        ma_dead(f, MaWindow::Ma5, MaWindow::Ma20, i)
    });
    t.insert((I::Ma, S::MaMa5DeadCrossMa30), |_, f, i| {
        ma_dead(f, MaWindow::Ma5, MaWindow::Ma30, i)
    });
    t.insert((I::Ma, S::MaMa3DeadCrossMa15), |_, f, i| {
        ma_dead(f, MaWindow::Ma3, MaWindow::Ma15, i)
    });
    t.insert((I::Ma, S::MaBullishArrange), |_, f, i| {
        ma_arranged(f, i, |a, b, c| a > b && b > c)
    });
    t.insert((I::Ma, S::MaBearishArrange), |_, f, i| {
        ma_arranged(f, i, |a, b, c| a < b && b < c)
    });

    // CANDLE
    t.insert((I::Candle, S::CandleBarefootBearish), |p, f, i| {
        with_bar(f, i, |b| {
            b.is_bearish() && near(b.close, b.low, p.tolerance_or(DEFAULT_CANDLE_TOLERANCE))
        })
    });
    t.insert((I::Candle, S::CandleBarefootBullish), |p, f, i| {
        with_bar(f, i, |b| {
            b.is_bullish() && near(b.close, b.high, p.tolerance_or(DEFAULT_CANDLE_TOLERANCE))
        })
    });
    t.insert((I::Candle, S::CandleBaldBearish), |p, f, i| {
        with_bar(f, i, |b| {
            b.is_bearish() && near(b.open, b.high, p.tolerance_or(DEFAULT_CANDLE_TOLERANCE))
        })
    });
    // Same price test as barefoot bullish: a bullish bar's close is its top.
    t.insert((I::Candle, S::CandleBaldBullish), |p, f, i| {
        with_bar(f, i, |b| {
            b.is_bullish() && near(b.close, b.high, p.tolerance_or(DEFAULT_CANDLE_TOLERANCE))
        })
    });
    t.insert((I::Candle, S::CandleDoji), |p, f, i| {
        with_bar(f, i, |b| {
            ratio(b.body().abs(), b.range()).is_some_and(|r| r < p.threshold_or(DOJI_BODY_RATIO))
        })
    });
    t.insert((I::Candle, S::CandleBigYang), |p, f, i| {
        with_bar(f, i, |b| {
            b.body() > 0.0
                && ratio(b.body(), b.range()).is_some_and(|r| r > p.threshold_or(BIG_BODY_RATIO))
        })
    });
    t.insert((I::Candle, S::CandleBigYin), |p, f, i| {
        with_bar(f, i, |b| {
            b.body() < 0.0
                && ratio(-b.body(), b.range()).is_some_and(|r| r > p.threshold_or(BIG_BODY_RATIO))
        })
    });
    t.insert((I::Candle, S::CandleLongUpperShadow), |p, f, i| {
        with_bar(f, i, |b| {
            b.upper_shadow() > b.body().abs() * p.threshold_or(LONG_SHADOW_MULTIPLE)
        })
    });
    t.insert((I::Candle, S::CandleBullishEngulfing), |_, f, i| {
        with_pair(f, i, |prev, curr| {
            prev.is_bearish()
                && curr.is_bullish()
                && curr.close > prev.open
                && curr.open < prev.close
        })
    });
    t.insert((I::Candle, S::CandleBearishEngulfing), |_, f, i| {
        with_pair(f, i, |prev, curr| {
            prev.is_bullish()
                && curr.is_bearish()
                && curr.close < prev.open
                && curr.open > prev.close
        })
    });

    t
}

fn pair(frame: &EnrichedFrame, a: Column, b: Column, idx: usize) -> Option<(f64, f64)> {
    Some((frame.value(a, idx)?, frame.value(b, idx)?))
}

/// `a - b` goes from `<= 0` at i-1 to `> 0` at i.
pub fn crossed_above(frame: &EnrichedFrame, a: Column, b: Column, idx: usize) -> bool {
    if idx == 0 {
        return false;
    }
    match (pair(frame, a, b, idx - 1), pair(frame, a, b, idx)) {
        (Some((pa, pb)), Some((ca, cb))) => pa - pb <= 0.0 && ca - cb > 0.0,
        _ => false,
    }
}

/// `a - b` goes from `>= 0` at i-1 to `< 0` at i.
pub fn crossed_below(frame: &EnrichedFrame, a: Column, b: Column, idx: usize) -> bool {
    if idx == 0 {
        return false;
    }
    match (pair(frame, a, b, idx - 1), pair(frame, a, b, idx)) {
        (Some((pa, pb)), Some((ca, cb))) => pa - pb >= 0.0 && ca - cb < 0.0,
        _ => false,
    }
}

fn crossed_above_level(frame: &EnrichedFrame, col: Column, level: f64, idx: usize) -> bool {
    if idx == 0 {
        return false;
    }
    match (frame.value(col, idx - 1), frame.value(col, idx)) {
        (Some(prev), Some(curr)) => prev <= level && curr > level,
        _ => false,
    }
}

fn crossed_below_level(frame: &EnrichedFrame, col: Column, level: f64, idx: usize) -> bool {
    if idx == 0 {
        return false;
    }
    match (frame.value(col, idx - 1), frame.value(col, idx)) {
        (Some(prev), Some(curr)) => prev >= level && curr < level,
        _ => false,
    }
}

fn above_level(frame: &EnrichedFrame, col: Column, level: f64, idx: usize) -> bool {
    frame.value(col, idx).is_some_and(|v| v > level)
}

fn below_level(frame: &EnrichedFrame, col: Column, level: f64, idx: usize) -> bool {
    frame.value(col, idx).is_some_and(|v| v < level)
}

fn rising(frame: &EnrichedFrame, col: Column, idx: usize) -> bool {
    idx > 0
        && matches!(
            (frame.value(col, idx - 1), frame.value(col, idx)),
            (Some(prev), Some(curr)) if curr > prev
        )
}

fn falling(frame: &EnrichedFrame, col: Column, idx: usize) -> bool {
    idx > 0
        && matches!(
            (frame.value(col, idx - 1), frame.value(col, idx)),
            (Some(prev), Some(curr)) if curr < prev
        )
}

fn close_above_ma(frame: &EnrichedFrame, w: MaWindow, idx: usize) -> bool {
    pair(frame, Column::Close, Column::Ma(w), idx).is_some_and(|(c, m)| c > m)
}

fn close_below_ma(frame: &EnrichedFrame, w: MaWindow, idx: usize) -> bool {
    pair(frame, Column::Close, Column::Ma(w), idx).is_some_and(|(c, m)| c < m)
}

fn ma_golden(frame: &EnrichedFrame, fast: MaWindow, slow: MaWindow, idx: usize) -> bool {
    crossed_above(frame, Column::Ma(fast), Column::Ma(slow), idx)
}

fn ma_dead(frame: &EnrichedFrame, fast: MaWindow, slow: MaWindow, idx: usize) -> bool {
    crossed_below(frame, Column::Ma(fast), Column::Ma(slow), idx)
}

fn ma_arranged(frame: &EnrichedFrame, idx: usize, order: fn(f64, f64, f64) -> bool) -> bool {
    let ma = |w| frame.value(Column::Ma(w), idx);
    match (ma(MaWindow::Ma5), ma(MaWindow::Ma10), ma(MaWindow::Ma20)) {
        (Some(a), Some(b), Some(c)) => order(a, b, c),
        _ => false,
    }
}

fn with_bar(frame: &EnrichedFrame, idx: usize, test: impl FnOnce(&Bar) -> bool) -> bool {
    frame.bar(idx).is_some_and(test)
}

fn with_pair(frame: &EnrichedFrame, idx: usize, test: impl FnOnce(&Bar, &Bar) -> bool) -> bool {
    if idx == 0 {
        return false;
    }
    match (frame.bar(idx - 1), frame.bar(idx)) {
        (Some(prev), Some(curr)) => test(prev, curr),
        _ => false,
    }
}

/// `num / den`, or `None` for a zero denominator or a non-finite result.
fn ratio(num: f64, den: f64) -> Option<f64> {
    if den == 0.0 {
        return None;
    }
    let r = num / den;
    r.is_finite().then_some(r)
}

/// `|price - reference| / reference < tolerance`
fn near(price: f64, reference: f64, tolerance: f64) -> bool {
    ratio((price - reference).abs(), reference).is_some_and(|r| r < tolerance)
}
