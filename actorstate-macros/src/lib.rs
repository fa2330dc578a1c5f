// lib.rs - Root of macro crate
use proc_macro::TokenStream;

mod record;

/// Derives `Record` and `ActorState` for a struct with named fields.
///
/// Attributes:
/// - `#[record(name = "...")]` on the struct overrides the record name.
/// - `#[record(key)]` marks a primary-key field; without any, `id` is used.
/// - `#[record(concurrency_token)]` marks the field checked on update and delete.
/// - `#[record(skip)]` leaves a field out of the model.
///
/// Non-`pub` fields are described but not publicly readable.
#[proc_macro_derive(Record, attributes(record))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    record::derive_record_impl(input)
}
