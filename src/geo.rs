use crate::heading::Heading;
use uom::si::{f64::Length, length::meter};

/// Mean earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// A geographic position in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoPoint {
    lon: f64,
    lat: f64,
}

impl GeoPoint {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    pub fn lon(&self) -> f64 {
        self.lon
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    /// Great-circle distance to `other` using the haversine formula.
    pub fn distance_to(&self, other: &GeoPoint) -> Length {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let d_lat = lat2 - lat1;
        let d_lon = (other.lon - self.lon).to_radians();

        let a = (d_lat / 2.).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.).sin().powi(2);
        let c = 2. * a.sqrt().atan2((1. - a).sqrt());

        Length::new::<meter>(EARTH_RADIUS_M * c)
    }

    /// Initial great-circle bearing towards `other`, clockwise from north.
    pub fn bearing_to(&self, other: &GeoPoint) -> Heading {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let d_lon = (other.lon - self.lon).to_radians();

        let y = d_lon.sin() * lat2.cos();
        let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lon.cos();

        Heading::from_degrees_wrapped(y.atan2(x).to_degrees())
    }

    /// Offset from `self` to `other` on a local plane tangent at `self`.
    ///
    /// Uses the equirectangular approximation, which is accurate to well
    /// under a meter over the tens of meters separating a vehicle from a
    /// building.
    pub fn offset_to(&self, other: &GeoPoint) -> LocalOffset {
        let d_lon = (other.lon - self.lon).to_radians();
        let d_lat = (other.lat - self.lat).to_radians();

        LocalOffset {
            east: EARTH_RADIUS_M * d_lon * self.lat.to_radians().cos(),
            north: EARTH_RADIUS_M * d_lat,
        }
    }

    /// Inverse of [`GeoPoint::offset_to`].
    pub fn translate(&self, offset: LocalOffset) -> GeoPoint {
        let d_lat = (offset.north / EARTH_RADIUS_M).to_degrees();
        let d_lon = (offset.east / (EARTH_RADIUS_M * self.lat.to_radians().cos())).to_degrees();

        GeoPoint::new(self.lon + d_lon, self.lat + d_lat)
    }
}

/// A planar east/north displacement in meters.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LocalOffset {
    pub east: f64,
    pub north: f64,
}

impl LocalOffset {
    pub fn new(east: f64, north: f64) -> Self {
        Self { east, north }
    }

    pub fn length(&self) -> Length {
        Length::new::<meter>(self.east.hypot(self.north))
    }

    /// Direction of the offset, clockwise from north.
    pub fn bearing(&self) -> Heading {
        Heading::from_degrees_wrapped(self.east.atan2(self.north).to_degrees())
    }
}
