use std::time::Duration;

use crate::error::{Error, Result};

/// Upper bound on the users one profile may schedule; every user costs a start offset up front.
pub const MAX_SCHEDULED_USERS: u64 = 10_000_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InjectionStep {
    /// `users` start together at the beginning of the step.
    AtOnce { users: u64 },
    /// User `i` starts at `i * during / users`.
    Ramp { users: u64, during: Duration },
    /// `floor(rate * during)` users, user `i` at `i / rate`.
    ConstantRate { rate: f64, during: Duration },
    /// Shifts every later step.
    NothingFor(Duration),
}

impl InjectionStep {
    pub fn duration(&self) -> Duration {
        match *self {
            Self::AtOnce { .. } => Duration::ZERO,
            Self::Ramp { during, .. } | Self::ConstantRate { during, .. } => during,
            Self::NothingFor(d) => d,
        }
    }

    pub fn users(&self) -> u64 {
        match *self {
            Self::AtOnce { users } | Self::Ramp { users, .. } => users,
            Self::ConstantRate { rate, during } => (rate * during.as_secs_f64()).floor() as u64,
            Self::NothingFor(_) => 0,
        }
    }
}

/// Sequential injection steps, expanded into one start offset per virtual user.
#[derive(Debug, Clone, Default)]
pub struct InjectionProfile {
    steps: Vec<InjectionStep>,
    cumulative_ends: Vec<Duration>,
    offsets: Vec<Duration>,
}

impl InjectionProfile {
    pub fn new(steps: Vec<InjectionStep>) -> Result<Self> {
        for step in &steps {
            if let InjectionStep::ConstantRate { rate, .. } = step
                && !(rate.is_finite() && *rate >= 0.0)
            {
                return Err(Error::InvalidInjection(format!(
                    "constant rate must be a non-negative number, got {rate}"
                )));
            }
        }

        let mut total: u64 = 0;
        for step in &steps {
            total = total.saturating_add(step.users());
            if total > MAX_SCHEDULED_USERS {
                return Err(Error::InvalidInjection(format!(
                    "profile schedules more than {MAX_SCHEDULED_USERS} users"
                )));
            }
        }

        let mut cumulative_ends = Vec::with_capacity(steps.len());
        let mut offsets = Vec::new();
        let mut cursor = Duration::ZERO;

        for step in &steps {
            match *step {
                InjectionStep::AtOnce { users } => {
                    offsets.extend(std::iter::repeat_n(cursor, to_usize(users)?));
                }
                InjectionStep::Ramp { users, during } => {
                    let n = u128::from(users);
                    let span = during.as_nanos();
                    for i in 0..n {
                        offsets.push(cursor.saturating_add(nanos(span * i / n)));
                    }
                }
                InjectionStep::ConstantRate { rate, .. } => {
                    let n = step.users();
                    to_usize(n)?;
                    for i in 0..n {
                        let at = Duration::from_secs_f64(i as f64 / rate);
                        offsets.push(cursor.saturating_add(at));
                    }
                }
                InjectionStep::NothingFor(_) => {}
            }
            cursor = cursor.saturating_add(step.duration());
            cumulative_ends.push(cursor);
        }

        Ok(Self {
            steps,
            cumulative_ends,
            offsets,
        })
    }

    pub fn at_once(users: u64) -> Self {
        Self::from_valid(InjectionStep::AtOnce { users })
    }

    pub fn ramp(users: u64, during: Duration) -> Self {
        Self::from_valid(InjectionStep::Ramp { users, during })
    }

    fn from_valid(step: InjectionStep) -> Self {
        match Self::new(vec![step]) {
            Ok(p) => p,
            Err(_) => Self::default(),
        }
    }

    pub fn steps(&self) -> &[InjectionStep] {
        &self.steps
    }

    /// Start offsets, non-decreasing.
    pub fn start_offsets(&self) -> &[Duration] {
        &self.offsets
    }

    pub fn total_users(&self) -> u64 {
        self.offsets.len() as u64
    }

    pub fn total_duration(&self) -> Duration {
        self.cumulative_ends
            .last()
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    /// Number of users whose start offset is at or before `elapsed`.
    pub fn started_by(&self, elapsed: Duration) -> u64 {
        self.offsets.partition_point(|o| *o <= elapsed) as u64
    }

    /// 0-based index of the step active at `elapsed`, or `None` once the profile is over.
    pub fn step_at(&self, elapsed: Duration) -> Option<usize> {
        if elapsed >= self.total_duration() {
            return None;
        }
        let idx = match self
            .cumulative_ends
            .binary_search_by(|end| end.cmp(&elapsed))
        {
            Ok(i) => i + 1,
            Err(i) => i,
        };
        (idx < self.steps.len()).then_some(idx)
    }
}

fn nanos(n: u128) -> Duration {
    Duration::from_nanos(n.min(u128::from(u64::MAX)) as u64)
}

fn to_usize(users: u64) -> Result<usize> {
    usize::try_from(users)
        .map_err(|_| Error::InvalidInjection(format!("too many users: {users}")))
}
