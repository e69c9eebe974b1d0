//! Typed messages carried by the wire frames.

/// Display routine tag understood by the LED client hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routine {
    Off,
    Calibrating,
    Filling,
    Measuring,
    BecameEmpty,
}

impl Routine {
    pub fn tag(self) -> char {
        match self {
            Routine::Off => 'O',
            Routine::Calibrating => 'C',
            Routine::Filling => 'F',
            Routine::Measuring => 'M',
            Routine::BecameEmpty => 'E',
        }
    }

    pub fn from_tag(tag: char) -> Option<Self> {
        match tag {
            'O' => Some(Routine::Off),
            'C' => Some(Routine::Calibrating),
            'F' => Some(Routine::Filling),
            'M' => Some(Routine::Measuring),
            'E' => Some(Routine::BecameEmpty),
            _ => None,
        }
    }
}

/// Optional fields of a full status frame. Each field is independently
/// present; the receiving side must not assume any particular subset.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatusFields {
    pub percent: Option<f64>,
    pub full_mass_kg: Option<f64>,
    pub empty_mass_kg: Option<f64>,
    pub load_kg: Option<f64>,
    pub variance: Option<f64>,
}

/// One decoded frame, command or telemetry, addressed to/from a meter slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Message {
    /// Host orders the meter display to a percent (clamped to [0,1]).
    SetPercent { meter: usize, percent: f64 },
    /// Host orders a specific display routine.
    SetRoutine { meter: usize, routine: Routine },
    /// Host starts the empty-point calibration routine.
    CalibrateEmpty { meter: usize },
    /// Host starts the known-mass calibration routine.
    CalibrateNonEmpty { meter: usize, known_mass_kg: f64 },
    /// Host clears all calibration state for the meter. The meter rests
    /// inert afterwards; a calibrate command re-arms keg detection.
    Reset { meter: usize },
    /// Node reports a settled measurement update.
    Measurement { meter: usize, percent: f64 },
    /// Node reports full telemetry for the meter.
    Status { meter: usize, fields: StatusFields },
}

impl Message {
    /// Meter slot this message addresses or originates from.
    pub fn meter(&self) -> usize {
        match *self {
            Message::SetPercent { meter, .. }
            | Message::SetRoutine { meter, .. }
            | Message::CalibrateEmpty { meter }
            | Message::CalibrateNonEmpty { meter, .. }
            | Message::Reset { meter }
            | Message::Measurement { meter, .. }
            | Message::Status { meter, .. } => meter,
        }
    }
}
