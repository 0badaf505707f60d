use chrono::NaiveDate;

/// Deterministic 32-bit generator (mulberry32 family). The whole simulation
/// draws from this so that one seed reproduces one full session.
#[derive(Clone, Debug)]
pub struct Rng {
    seed: u32,
}

impl Rng {
    pub fn new(seed: u32) -> Self {
        Self { seed }
    }

    /// Seeded from a (user, calendar day) pair: the same user on the same day
    /// always receives the same draw sequence, independent of call timing.
    pub fn for_user_day(user_id: &str, date: NaiveDate) -> Self {
        let key = format!("{user_id}:{}", date.format("%Y-%m-%d"));
        Self::new(hash_string(&key))
    }

    pub fn next_f32(&mut self) -> f32 {
        self.seed = self.seed.wrapping_add(0x6d2b79f5);
        let mut t = self.seed;
        t = (t ^ (t >> 15)).wrapping_mul(t | 1);
        t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
        let out = t ^ (t >> 14);
        (out as f64 / 4_294_967_296.0) as f32
    }

    pub fn next_f64(&mut self) -> f64 {
        self.seed = self.seed.wrapping_add(0x6d2b79f5);
        let mut t = self.seed;
        t = (t ^ (t >> 15)).wrapping_mul(t | 1);
        t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
        let out = t ^ (t >> 14);
        out as f64 / 4_294_967_296.0
    }

    pub fn int(&mut self, min: i32, max: i32) -> i32 {
        if max <= min {
            return min;
        }
        let span = (max - min + 1) as f32;
        min + (self.next_f32() * span).floor() as i32
    }

    pub fn bool(&mut self, probability: f32) -> bool {
        self.next_f32() < probability
    }

    pub fn pick_index(&mut self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        (self.next_f32() * len as f32).floor().min((len - 1) as f32) as usize
    }

    /// Uniform Fisher–Yates shuffle.
    pub fn shuffle<T>(&mut self, values: &mut [T]) {
        for idx in (1..values.len()).rev() {
            let other = self.pick_index(idx + 1);
            values.swap(idx, other);
        }
    }
}

/// Source of reward draws in `[0, 1)`. The resolver never produces its own
/// randomness; callers pick pure chance or a reproducible seeded stream.
#[derive(Clone)]
pub enum DrawSource {
    /// Unseeded uniform chance.
    Uniform,
    /// Deterministic stream from an explicit seed.
    Seeded(Rng),
}

impl DrawSource {
    pub fn seeded(seed: u32) -> Self {
        Self::Seeded(Rng::new(seed))
    }

    pub fn for_user_day(user_id: &str, date: NaiveDate) -> Self {
        Self::Seeded(Rng::for_user_day(user_id, date))
    }

    pub fn draw(&mut self) -> f64 {
        match self {
            Self::Uniform => rand::random::<f64>(),
            Self::Seeded(rng) => rng.next_f64(),
        }
    }
}

impl std::fmt::Debug for DrawSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uniform => write!(f, "DrawSource::Uniform"),
            Self::Seeded(rng) => write!(f, "DrawSource::Seeded({rng:?})"),
        }
    }
}

fn hash_string(value: &str) -> u32 {
    let mut hash = 0x811c_9dc5u32;
    for byte in value.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    // one extra avalanche round so short keys spread over the full state
    hash ^= hash >> 16;
    hash = hash.wrapping_mul(0x45d9_f3b5);
    hash ^ (hash >> 13)
}
