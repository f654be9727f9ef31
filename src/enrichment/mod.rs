//! Optional data-fill conveniences: postal-code autofill, device location and
//! address geocoding. None of these can block the wizard; failures become
//! notices and the user keeps entering the data by hand.

pub mod geo;
pub mod postal;

pub use geo::{
    address_query, fill_from_address, fill_from_device, CoordinateFields, Coordinates,
    GeocodeMatch, Geocoder, LocationProvider, NoLocation, NominatimGeocoder,
};
pub use postal::{AddressAutofill, AddressFields, PostalAddress, PostalLookup, ViaCepLookup};

/// What an enrichment action did to the form data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    /// The trigger condition was not met; nothing was looked up.
    Skipped,
    /// Fields that received a value.
    Filled(Vec<String>),
    NotFound,
    Failed(String),
}
