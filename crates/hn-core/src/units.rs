// hn-core/src/units.rs

use uom::si::f64::{
    Acceleration as UomAcceleration, Area as UomArea, Length as UomLength, Time as UomTime,
    Velocity as UomVelocity, Volume as UomVolume, VolumeRate as UomVolumeRate,
};

// Public canonical unit types (SI, f64)
pub type Accel = UomAcceleration;
pub type Area = UomArea;
pub type Length = UomLength;
pub type Time = UomTime;
pub type Velocity = UomVelocity;
pub type Volume = UomVolume;
pub type VolumeRate = UomVolumeRate;

#[inline]
pub fn m(v: f64) -> Length {
    use uom::si::length::meter;
    Length::new::<meter>(v)
}

#[inline]
pub fn s(v: f64) -> Time {
    use uom::si::time::second;
    Time::new::<second>(v)
}

#[inline]
pub fn cms(v: f64) -> VolumeRate {
    use uom::si::volume_rate::cubic_meter_per_second;
    VolumeRate::new::<cubic_meter_per_second>(v)
}

pub mod constants {
    use super::*;

    pub const G0_MPS2: f64 = 9.806_65;
    pub const SECONDS_PER_HOUR: i64 = 3600;
    /// Pressure of one metre of water column, in psi (specific gravity 1).
    pub const PSI_PER_M_HEAD: f64 = 1.421_970_2;

    #[inline]
    pub fn g0() -> Accel {
        use uom::si::acceleration::meter_per_second_squared;
        Accel::new::<meter_per_second_squared>(G0_MPS2)
    }
}

/// Customary or metric project units, implied by the flow units.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnitSystem {
    Us,
    Si,
}

/// Flow units a project is expressed in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
pub enum FlowUnits {
    Cfs,
    Gpm,
    Mgd,
    Imgd,
    Afd,
    #[default]
    Lps,
    Lpm,
    Mld,
    Cmh,
    Cmd,
}

impl FlowUnits {
    pub fn system(self) -> UnitSystem {
        match self {
            FlowUnits::Cfs | FlowUnits::Gpm | FlowUnits::Mgd | FlowUnits::Imgd | FlowUnits::Afd => {
                UnitSystem::Us
            }
            _ => UnitSystem::Si,
        }
    }

    /// Project flow units per m³/s.
    fn per_cms(self) -> f64 {
        match self {
            FlowUnits::Cfs => 35.3147,
            FlowUnits::Gpm => 15_850.3,
            FlowUnits::Mgd => 22.8245,
            FlowUnits::Imgd => 19.0053,
            FlowUnits::Afd => 70.0456,
            FlowUnits::Lps => 1000.0,
            FlowUnits::Lpm => 60_000.0,
            FlowUnits::Mld => 86.4,
            FlowUnits::Cmh => 3600.0,
            FlowUnits::Cmd => 86_400.0,
        }
    }
}

/// Converts between project units and the SI values the engine works in.
///
/// Lengths, elevations and heads are ft|m; diameters in|mm; pressure psi|m
/// of head; velocity ft/s|m/s; flow per [`FlowUnits`].
#[derive(Clone, Copy, Debug)]
pub struct UnitConverter {
    flow_units: FlowUnits,
}

impl UnitConverter {
    pub fn new(flow_units: FlowUnits) -> Self {
        Self { flow_units }
    }

    pub fn system(&self) -> UnitSystem {
        self.flow_units.system()
    }

    pub fn length_to_si(&self, v: f64) -> Length {
        use uom::si::length::{foot, meter};
        match self.system() {
            UnitSystem::Us => Length::new::<foot>(v),
            UnitSystem::Si => Length::new::<meter>(v),
        }
    }

    pub fn length_to_project(&self, v: Length) -> f64 {
        use uom::si::length::{foot, meter};
        match self.system() {
            UnitSystem::Us => v.get::<foot>(),
            UnitSystem::Si => v.get::<meter>(),
        }
    }

    pub fn diameter_to_si(&self, v: f64) -> Length {
        use uom::si::length::{inch, millimeter};
        match self.system() {
            UnitSystem::Us => Length::new::<inch>(v),
            UnitSystem::Si => Length::new::<millimeter>(v),
        }
    }

    pub fn velocity_to_project(&self, v: Velocity) -> f64 {
        use uom::si::velocity::{foot_per_second, meter_per_second};
        match self.system() {
            UnitSystem::Us => v.get::<foot_per_second>(),
            UnitSystem::Si => v.get::<meter_per_second>(),
        }
    }

    /// Pressure from metres of water column.
    pub fn pressure_to_project(&self, head: Length) -> f64 {
        use uom::si::length::meter;
        match self.system() {
            UnitSystem::Us => head.get::<meter>() * constants::PSI_PER_M_HEAD,
            UnitSystem::Si => head.get::<meter>(),
        }
    }

    /// Pressure (m or psi) as metres of water column.
    pub fn pressure_to_si(&self, v: f64) -> Length {
        match self.system() {
            UnitSystem::Us => m(v / constants::PSI_PER_M_HEAD),
            UnitSystem::Si => m(v),
        }
    }

    /// Darcy-Weisbach roughness height (mm or millifeet).
    pub fn roughness_to_si(&self, v: f64) -> Length {
        use uom::si::length::{foot, millimeter};
        match self.system() {
            UnitSystem::Us => Length::new::<foot>(v * 1e-3),
            UnitSystem::Si => Length::new::<millimeter>(v),
        }
    }

    pub fn flow_to_si(&self, v: f64) -> VolumeRate {
        cms(v / self.flow_units.per_cms())
    }

    pub fn flow_to_project(&self, v: VolumeRate) -> f64 {
        use uom::si::volume_rate::cubic_meter_per_second;
        v.get::<cubic_meter_per_second>() * self.flow_units.per_cms()
    }
}
