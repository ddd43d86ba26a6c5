//! Pacing policy: per-message composition delay, post-send pacing and the
//! periodic cooldown.
//!
//! ```text
//! claim ──► typing delay ──► send ──► pace delay ──► (claim again)
//!   ▲                                                   │
//!   └──── cooldown (every max_messages_per_channel) ◄───┘
//! ```
//!
//! Every draw has a `*_with` variant taking an explicit RNG so tests can
//! seed it; the plain variants use the thread RNG and never hold it across
//! an await.

use std::time::Duration;

use courier_core::config::PacingConfig;
use rand::Rng;

/// Which branch of the cooldown was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownKind {
    /// Rare long break.
    OccasionalBreak,
    /// Regular pause, itself sometimes drawn from the extended range.
    ExtendedPause,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cooldown {
    pub kind: CooldownKind,
    pub duration: Duration,
}

#[derive(Debug, Clone)]
pub struct PacingPolicy {
    config: PacingConfig,
}

impl PacingPolicy {
    pub fn new(config: PacingConfig) -> Self {
        Self { config }
    }

    /// Whether a channel must cool down before its next claim.
    pub fn needs_cooldown(&self, sent_since_reset: u32) -> bool {
        sent_since_reset >= self.config.max_messages_per_channel
    }

    /// Reading time plus writing time proportional to the body's word count.
    pub fn typing_delay(&self, body: &str) -> Duration {
        self.typing_delay_with(&mut rand::thread_rng(), body)
    }

    pub fn typing_delay_with<R: Rng + ?Sized>(&self, rng: &mut R, body: &str) -> Duration {
        let c = &self.config;
        let words = word_count(body);
        let reading = between(rng, c.reading_min_ms, c.reading_max_ms);
        let writing = between(rng, c.writing_min_ms, c.writing_max_ms)
            + words * between(rng, c.per_word_min_ms, c.per_word_max_ms);
        Duration::from_millis(reading + writing)
    }

    /// Delay after a finished send before the channel may claim again.
    pub fn pace_delay(&self) -> Duration {
        self.pace_delay_with(&mut rand::thread_rng())
    }

    pub fn pace_delay_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let c = &self.config;
        let ms = if rng.gen_bool(c.extended_pause_probability) {
            between(rng, c.extended_pause_min_ms, c.extended_pause_max_ms)
        } else {
            between(rng, c.message_pace_min_ms, c.message_pace_max_ms)
        };
        Duration::from_millis(ms)
    }

    /// Cooldown taken once a channel reaches `max_messages_per_channel`.
    pub fn cooldown(&self) -> Cooldown {
        self.cooldown_with(&mut rand::thread_rng())
    }

    pub fn cooldown_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Cooldown {
        let c = &self.config;
        if rng.gen_bool(c.occasional_break_probability) {
            Cooldown {
                kind: CooldownKind::OccasionalBreak,
                duration: Duration::from_millis(between(
                    rng,
                    c.occasional_break_min_ms,
                    c.occasional_break_max_ms,
                )),
            }
        } else {
            Cooldown {
                kind: CooldownKind::ExtendedPause,
                duration: self.pace_delay_with(rng),
            }
        }
    }
}

/// Space-separated word count; an empty body still counts as one word.
fn word_count(body: &str) -> u64 {
    body.split(' ').count() as u64
}

/// Uniform draw in `[min, max]`.
fn between<R: Rng + ?Sized>(rng: &mut R, min: u64, max: u64) -> u64 {
    if min >= max {
        min
    } else {
        rng.gen_range(min..=max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn fixed() -> PacingConfig {
        PacingConfig {
            max_messages_per_channel: 7,
            message_pace_min_ms: 2_000,
            message_pace_max_ms: 2_000,
            extended_pause_probability: 0.0,
            extended_pause_min_ms: 9_000,
            extended_pause_max_ms: 9_000,
            occasional_break_probability: 0.0,
            occasional_break_min_ms: 40_000,
            occasional_break_max_ms: 40_000,
            reading_min_ms: 1_000,
            reading_max_ms: 1_000,
            writing_min_ms: 1_500,
            writing_max_ms: 1_500,
            per_word_min_ms: 100,
            per_word_max_ms: 100,
        }
    }

    #[test]
    fn test_typing_delay_scales_with_words() {
        let policy = PacingPolicy::new(fixed());
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            policy.typing_delay_with(&mut rng, "hi"),
            Duration::from_millis(1_000 + 1_500 + 100)
        );
        assert_eq!(
            policy.typing_delay_with(&mut rng, "one two three four"),
            Duration::from_millis(1_000 + 1_500 + 400)
        );
        assert_eq!(word_count(""), 1);
    }

    #[test]
    fn test_typing_delay_within_default_bounds() {
        let policy = PacingPolicy::new(PacingConfig::default());
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let d = policy.typing_delay_with(&mut rng, "hola que tal").as_millis();
            assert!((1_000 + 1_500 + 3 * 50..=2_000 + 3_000 + 3 * 100).contains(&d));
        }
    }

    #[test]
    fn test_pace_delay_branches() {
        let mut cfg = fixed();
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(
            PacingPolicy::new(cfg.clone()).pace_delay_with(&mut rng),
            Duration::from_millis(2_000)
        );
        cfg.extended_pause_probability = 1.0;
        assert_eq!(
            PacingPolicy::new(cfg).pace_delay_with(&mut rng),
            Duration::from_millis(9_000)
        );
    }

    #[test]
    fn test_cooldown_branches() {
        let mut cfg = fixed();
        let mut rng = StdRng::seed_from_u64(11);
        let pause = PacingPolicy::new(cfg.clone()).cooldown_with(&mut rng);
        assert_eq!(pause.kind, CooldownKind::ExtendedPause);
        assert_eq!(pause.duration, Duration::from_millis(2_000));

        cfg.occasional_break_probability = 1.0;
        let brk = PacingPolicy::new(cfg).cooldown_with(&mut rng);
        assert_eq!(brk.kind, CooldownKind::OccasionalBreak);
        assert_eq!(brk.duration, Duration::from_millis(40_000));
    }

    #[test]
    fn test_needs_cooldown_at_threshold() {
        let policy = PacingPolicy::new(fixed());
        assert!(!policy.needs_cooldown(6));
        assert!(policy.needs_cooldown(7));
        assert!(policy.needs_cooldown(8));
    }
}
