//! Indicator pipeline.
//!
//! [`EnrichedFrame::compute`] maps an ordered bar sequence onto a fixed set of
//! derived columns. Every column has one entry per bar; an entry is `None`
//! when the value is not a finite number (warmup, zero denominators).
//! The value at index i is computed from bars `[0..=i]` only.

pub mod bollinger;
pub mod cci;
pub mod ema;
pub mod kdj;
pub mod macd;
pub mod rolling;
pub mod rsi;

use crate::domain::bar::Bar;
use bollinger::BollingerColumns;
use kdj::KdjColumns;
use macd::MacdColumns;

/// One derived value per bar.
pub type Series = Vec<Option<f64>>;

pub(crate) fn defined(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

const BBI_PERIODS: [usize; 4] = [3, 6, 12, 24];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaWindow {
    Ma3,
    Ma5,
    Ma10,
    Ma15,
    Ma20,
    Ma30,
    Ma60,
}

impl MaWindow {
    pub const ALL: [MaWindow; 7] = [
        MaWindow::Ma3,
        MaWindow::Ma5,
        MaWindow::Ma10,
        MaWindow::Ma15,
        MaWindow::Ma20,
        MaWindow::Ma30,
        MaWindow::Ma60,
    ];

    pub fn period(self) -> usize {
        match self {
            MaWindow::Ma3 => 3,
            MaWindow::Ma5 => 5,
            MaWindow::Ma10 => 10,
            MaWindow::Ma15 => 15,
            MaWindow::Ma20 => 20,
            MaWindow::Ma30 => 30,
            MaWindow::Ma60 => 60,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Addressable column of an [`EnrichedFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Open,
    High,
    Low,
    Close,
    Volume,
    MacdLine,
    MacdSignal,
    MacdHistogram,
    Rsi,
    KdjK,
    KdjD,
    KdjJ,
    BollUpper,
    BollMiddle,
    BollLower,
    BollWidth,
    Bbi,
    Cci,
    Ma(MaWindow),
}

impl Column {
    pub const DERIVED: [Column; 20] = [
        Column::MacdLine,
        Column::MacdSignal,
        Column::MacdHistogram,
        Column::Rsi,
        Column::KdjK,
        Column::KdjD,
        Column::KdjJ,
        Column::BollUpper,
        Column::BollMiddle,
        Column::BollLower,
        Column::BollWidth,
        Column::Bbi,
        Column::Cci,
        Column::Ma(MaWindow::Ma3),
        Column::Ma(MaWindow::Ma5),
        Column::Ma(MaWindow::Ma10),
        Column::Ma(MaWindow::Ma15),
        Column::Ma(MaWindow::Ma20),
        Column::Ma(MaWindow::Ma30),
        Column::Ma(MaWindow::Ma60),
    ];
}

/// Bars plus every derived indicator column.
#[derive(Debug, Clone, Default)]
pub struct EnrichedFrame {
    bars: Vec<Bar>,
    macd: MacdColumns,
    rsi: Series,
    kdj: KdjColumns,
    bollinger: BollingerColumns,
    bbi: Series,
    cci: Series,
    ma: Vec<Series>,
}

impl EnrichedFrame {
    /// Run the full pipeline. Total over any input, including empty.
    pub fn compute(bars: Vec<Bar>) -> Self {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
        let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
        let typical: Vec<f64> = bars.iter().map(Bar::typical_price).collect();

        let ma = MaWindow::ALL
            .iter()
            .map(|w| to_series(rolling::rolling_mean(&closes, w.period())))
            .collect();

        Self {
            macd: macd::calculate_macd(
                &closes,
                macd::DEFAULT_FAST,
                macd::DEFAULT_SLOW,
                macd::DEFAULT_SIGNAL,
            ),
            rsi: rsi::calculate_rsi(&closes, rsi::DEFAULT_PERIOD),
            kdj: kdj::calculate_kdj(&highs, &lows, &closes, kdj::DEFAULT_PERIOD),
            bollinger: bollinger::calculate_bollinger(
                &closes,
                bollinger::DEFAULT_PERIOD,
                bollinger::DEFAULT_MULTIPLIER,
            ),
            bbi: calculate_bbi(&closes),
            cci: cci::calculate_cci(&typical, cci::DEFAULT_PERIOD),
            ma,
            bars,
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn bar(&self, idx: usize) -> Option<&Bar> {
        self.bars.get(idx)
    }

    pub fn last_index(&self) -> Option<usize> {
        self.bars.len().checked_sub(1)
    }

    /// Value of `column` at `idx`; `None` when out of range or undefined.
    pub fn value(&self, column: Column, idx: usize) -> Option<f64> {
        let from_bar = |f: fn(&Bar) -> f64| self.bars.get(idx).map(f).and_then(defined);
        let from = |s: &Series| s.get(idx).copied().flatten();
        match column {
            Column::Open => from_bar(|b| b.open),
            Column::High => from_bar(|b| b.high),
            Column::Low => from_bar(|b| b.low),
            Column::Close => from_bar(|b| b.close),
            Column::Volume => from_bar(|b| b.volume),
            Column::MacdLine => from(&self.macd.line),
            Column::MacdSignal => from(&self.macd.signal),
            Column::MacdHistogram => from(&self.macd.histogram),
            Column::Rsi => from(&self.rsi),
            Column::KdjK => from(&self.kdj.k),
            Column::KdjD => from(&self.kdj.d),
            Column::KdjJ => from(&self.kdj.j),
            Column::BollUpper => from(&self.bollinger.upper),
            Column::BollMiddle => from(&self.bollinger.middle),
            Column::BollLower => from(&self.bollinger.lower),
            Column::BollWidth => from(&self.bollinger.width),
            Column::Bbi => from(&self.bbi),
            Column::Cci => from(&self.cci),
            Column::Ma(w) => self.ma.get(w.index()).and_then(from),
        }
    }
}

/// Pipeline entry point over a borrowed bar slice.
pub fn compute(bars: &[Bar]) -> EnrichedFrame {
    EnrichedFrame::compute(bars.to_vec())
}

fn to_series(values: Vec<f64>) -> Series {
    values.into_iter().map(defined).collect()
}

/// BBI = mean of the 3/6/12/24-period simple moving averages.
fn calculate_bbi(closes: &[f64]) -> Series {
    let mas: Vec<Vec<f64>> = BBI_PERIODS
        .iter()
        .map(|&p| rolling::rolling_mean(closes, p))
        .collect();
    (0..closes.len())
        .map(|i| defined(mas.iter().map(|m| m[i]).sum::<f64>() / BBI_PERIODS.len() as f64))
        .collect()
}
