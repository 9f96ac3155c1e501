//! Identity field extraction from recognized text.

mod normalize;
pub mod rules;

pub use normalize::{NormalizedText, normalize};

use tracing::debug;

use crate::models::ExtractedFields;
use rules::{RuleBook, extract_birth_date, extract_id, extract_name};

/// Run the three field extractors over merged text.
///
/// The extractors share nothing, so their order does not matter.
pub fn extract_fields(text: &NormalizedText, book: &RuleBook) -> ExtractedFields {
    let id_number = extract_id(text, book);
    let (surname, given_name) = extract_name(text);
    let birth_date = extract_birth_date(text, book);

    debug!(
        "Extracted id={:?} surname={:?} given_name={:?} birth_date={:?}",
        id_number, surname, given_name, birth_date
    );

    ExtractedFields {
        id_number,
        surname,
        given_name,
        birth_date,
    }
}
