use std::ops::{Index, IndexMut};

/// A single scalar counter.
#[derive(Clone, Debug, Default)]
pub struct ValueFeature {
    value: i64,
}

impl ValueFeature {
    pub fn add(&mut self, val: i64) {
        self.value += val;
    }

    pub fn set(&mut self, val: i64) {
        self.value = val;
    }

    pub fn get(&self) -> i64 {
        self.value
    }

    pub fn export(&self) -> String {
        format!("{}", self.value)
    }
}

/// A running distribution over integer samples, kept as sum and
/// sum-of-squares so min/mean/max/stddev can be exported in one pass
/// with integer-only state.
#[derive(Clone, Debug, Default)]
pub struct DistFeature {
    sum: i64,
    sumsq: i64,
    count: i64,
    min: i64,
    max: i64,
}

impl DistFeature {
    pub fn add(&mut self, val: i64) {
        self.sum += val;
        self.sumsq += val * val;
        self.count += 1;
        if val < self.min || self.min == 0 {
            self.min = val;
        }
        if val > self.max {
            self.max = val;
        }
    }

    /// Resets the distribution to hold `val` as its single sample.
    /// Note that `count` becomes `val` itself, not 1; the exported mean
    /// and stddev after a `set` reflect that.
    pub fn set(&mut self, val: i64) {
        self.sum = val;
        self.sumsq = val * val;
        self.count = val;
        self.min = val;
        self.max = val;
    }

    /// The sample count doubles as the distribution's scalar reading.
    pub fn get(&self) -> i64 {
        self.count
    }

    pub fn export(&self) -> String {
        let mut mean: i64 = 0;
        let mut std_dev: i64 = 0;
        if self.count > 0 {
            mean = self.sum / self.count;
            std_dev = stddev(self.sumsq as f64, self.sum as f64, self.count) as i64;
        }
        format!("{},{},{},{}", self.min, mean, self.max, std_dev)
    }
}

/// Bins integer samples into a fixed number of counters covering
/// [min, max]. Samples above the range land in the last bin.
#[derive(Clone, Debug)]
pub struct BinFeature {
    bin_sep: i64,
    last_bin: usize,
    bins: Vec<i64>,
}

impl BinFeature {
    pub fn new(min: i64, max: i64, num_bins: usize) -> Self {
        let last_bin = num_bins - 1;
        BinFeature {
            bin_sep: (max - min) / last_bin as i64,
            last_bin,
            bins: vec![0; num_bins],
        }
    }

    pub fn add(&mut self, val: i64) {
        let bin = ((val / self.bin_sep) as usize).min(self.last_bin);
        self.bins[bin] += 1;
    }

    pub fn set(&mut self, val: i64) {
        for bin in self.bins.iter_mut() {
            *bin = val;
        }
    }

    pub fn get(&self) -> i64 {
        self.bins[0]
    }

    pub fn export(&self) -> String {
        self.bins
            .iter()
            .map(|count| count.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// The closed set of accumulator shapes a flow can carry.
#[derive(Clone, Debug)]
pub enum Feature {
    Value(ValueFeature),
    Dist(DistFeature),
    Bin(BinFeature),
}

impl Feature {
    pub fn add(&mut self, val: i64) {
        match self {
            Feature::Value(f) => f.add(val),
            Feature::Dist(f) => f.add(val),
            Feature::Bin(f) => f.add(val),
        }
    }

    pub fn set(&mut self, val: i64) {
        match self {
            Feature::Value(f) => f.set(val),
            Feature::Dist(f) => f.set(val),
            Feature::Bin(f) => f.set(val),
        }
    }

    pub fn get(&self) -> i64 {
        match self {
            Feature::Value(f) => f.get(),
            Feature::Dist(f) => f.get(),
            Feature::Bin(f) => f.get(),
        }
    }

    pub fn export(&self) -> String {
        match self {
            Feature::Value(f) => f.export(),
            Feature::Dist(f) => f.export(),
            Feature::Bin(f) => f.export(),
        }
    }
}

/// Slot names for the per-flow feature vector, in export order.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FeatureId {
    TotalFpackets,
    TotalFvolume,
    TotalBpackets,
    TotalBvolume,
    Fpktl,
    Bpktl,
    Fiat,
    Biat,
    Duration,
    Active,
    Idle,
    SflowFpackets,
    SflowFbytes,
    SflowBpackets,
    SflowBbytes,
    FpshCnt,
    BpshCnt,
    FurgCnt,
    BurgCnt,
    TotalFhlen,
    TotalBhlen,
}

pub const NUM_FEATURES: usize = 21;

/// The fixed accumulator vector owned by each flow, indexed by `FeatureId`.
#[derive(Clone, Debug)]
pub struct FeatureVec([Feature; NUM_FEATURES]);

impl FeatureVec {
    pub fn new() -> Self {
        FeatureVec([
            Feature::Value(ValueFeature::default()), // total_fpackets
            Feature::Value(ValueFeature::default()), // total_fvolume
            Feature::Value(ValueFeature::default()), // total_bpackets
            Feature::Value(ValueFeature::default()), // total_bvolume
            Feature::Dist(DistFeature::default()),   // fpktl
            Feature::Dist(DistFeature::default()),   // bpktl
            Feature::Dist(DistFeature::default()),   // fiat
            Feature::Dist(DistFeature::default()),   // biat
            Feature::Value(ValueFeature::default()), // duration
            Feature::Dist(DistFeature::default()),   // active
            Feature::Dist(DistFeature::default()),   // idle
            Feature::Value(ValueFeature::default()), // sflow_fpackets
            Feature::Value(ValueFeature::default()), // sflow_fbytes
            Feature::Value(ValueFeature::default()), // sflow_bpackets
            Feature::Value(ValueFeature::default()), // sflow_bbytes
            Feature::Value(ValueFeature::default()), // fpsh_cnt
            Feature::Value(ValueFeature::default()), // bpsh_cnt
            Feature::Value(ValueFeature::default()), // furg_cnt
            Feature::Value(ValueFeature::default()), // burg_cnt
            Feature::Value(ValueFeature::default()), // total_fhlen
            Feature::Value(ValueFeature::default()), // total_bhlen
        ])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.0.iter()
    }
}

impl Default for FeatureVec {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<FeatureId> for FeatureVec {
    type Output = Feature;

    fn index(&self, id: FeatureId) -> &Feature {
        &self.0[id as usize]
    }
}

impl IndexMut<FeatureId> for FeatureVec {
    fn index_mut(&mut self, id: FeatureId) -> &mut Feature {
        &mut self.0[id as usize]
    }
}

/// Sample standard deviation from the running sum and sum-of-squares.
fn stddev(sumsq: f64, sum: f64, count: i64) -> f64 {
    if count < 2 {
        return 0.0;
    }
    let n = count as f64;
    ((sumsq - (sum * sum / n)) / (n - 1.0)).sqrt()
}
