use syn::Expr;

/// Top-level `probe!` block.
pub struct ProbeInput {
    /// Name of the timer map, any expression convertible into a `String`.
    pub map: Expr,
    pub grid: GridInput,
    pub load: LoadInput,
    pub histogram: HistogramInput,
    pub report: ReportInput,
}

/// Grid node parameters.
pub struct GridInput {
    pub partitions: Expr,
    pub operation_threads: Expr,
    pub event_threads: Expr,
    pub sweep: SweepInput,
}

/// Expiration sweeper parameters.
pub struct SweepInput {
    /// Period of the sweeper, a `Duration` expression.
    pub interval: Expr,
    /// Partitions visited per sweep.
    pub partitions: Expr,
}

pub struct LoadInput {
    /// Inclusive range of TTL seconds, e.g. `1..=10`.
    pub ttl: Expr,
    pub repetitions: Expr,
}

pub struct HistogramInput {
    pub shards: Expr,
    pub reservoir: ReservoirInput,
}

/// Sampling strategy of the histogram shards.
pub enum ReservoirInput {
    Uniform { size: Expr },
    SlidingWindow { size: Expr },
}

pub struct ReportInput {
    pub interval: Expr,
}
