//! Mouth signal - the visual speech state pushed to the character every frame

/// Mouth shape derived from audio energy
///
/// Both fields are clamped on construction, so a `MouthSignal` is always in
/// range no matter what energy went into it.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MouthSignal {
    /// Mouth openness (0.0 = closed, 1.0 = fully open)
    open: f32,
    /// Mouth form (-1.0 = narrow, 0.0 = neutral, 1.0 = wide)
    form: f32,
}

impl MouthSignal {
    /// Closed, neutral mouth
    pub const NEUTRAL: MouthSignal = MouthSignal {
        open: 0.0,
        form: 0.0,
    };

    pub fn new(open: f32, form: f32) -> Self {
        Self {
            open: clamp_finite(open, 0.0, 1.0),
            form: clamp_finite(form, -1.0, 1.0),
        }
    }

    #[inline]
    pub fn open(&self) -> f32 {
        self.open
    }

    #[inline]
    pub fn form(&self) -> f32 {
        self.form
    }

    pub fn is_neutral(&self) -> bool {
        self.open == 0.0 && self.form == 0.0
    }

    /// Interpolate towards another signal
    pub fn lerp(&self, other: &MouthSignal, t: f32) -> MouthSignal {
        let t = clamp_finite(t, 0.0, 1.0);
        MouthSignal::new(
            self.open + (other.open - self.open) * t,
            self.form + (other.form - self.form) * t,
        )
    }
}

#[inline]
fn clamp_finite(value: f32, min: f32, max: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(min, max)
    }
}
