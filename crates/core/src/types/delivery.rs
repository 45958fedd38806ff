//! Static delivery pricing table.
//!
//! Lagos is priced per delivery area; every other state has one flat fee.

use crate::types::money::Naira;

/// Lagos delivery areas and their fees, in display order.
pub const LAGOS_AREAS: &[(&str, i64)] = &[
    ("Ikeja / Maryland / Anthony", 2500),
    ("Yaba / Surulere / Mushin", 2500),
    ("Gbagada / Ogudu / Ketu", 3000),
    ("Victoria Island / Ikoyi", 3500),
    ("Lekki / Ajah", 4000),
    ("Festac / Amuwo Odofin", 3500),
    ("Ikorodu", 4500),
    ("Epe / Ibeju-Lekki", 5000),
];

/// Flat fees for states outside Lagos.
pub const STATE_FEES: &[(&str, i64)] = &[
    ("Ogun", 4000),
    ("Oyo", 4500),
    ("Osun", 5000),
    ("Ondo", 5000),
    ("Ekiti", 5000),
    ("FCT - Abuja", 6000),
    ("Rivers", 6500),
    ("Delta", 6500),
    ("Edo", 6000),
    ("Enugu", 6500),
    ("Anambra", 6500),
    ("Kano", 7500),
    ("Kaduna", 7000),
];

/// Fee applied to any state not listed in [`STATE_FEES`].
pub const DEFAULT_STATE_FEE: i64 = 8000;

/// Look up the delivery fee for a state and, within Lagos, an area.
///
/// Returns `None` only for Lagos with a missing or unknown area, since the
/// buyer has to pick one of [`LAGOS_AREAS`] there. Matching ignores case and
/// surrounding whitespace.
///
/// ```
/// use oja_core::{Naira, delivery_fee};
///
/// assert_eq!(delivery_fee("Lagos", Some("Ikeja / Maryland / Anthony")), Some(Naira::whole(2500)));
/// assert_eq!(delivery_fee("Lagos", None), None);
/// ```
#[must_use]
pub fn delivery_fee(state: &str, area: Option<&str>) -> Option<Naira> {
    let state = state.trim();
    if state.eq_ignore_ascii_case("lagos") {
        let area = area?.trim();
        return LAGOS_AREAS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(area))
            .map(|&(_, fee)| Naira::whole(fee));
    }

    let fee = STATE_FEES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(state))
        .map_or(DEFAULT_STATE_FEE, |&(_, fee)| fee);
    Some(Naira::whole(fee))
}
