pub mod cards;
pub mod common;
pub mod consent;
pub mod page;
pub mod regions;
pub mod system;

pub use cards::CardsApi;
pub use consent::ConsentApi;
pub use page::PageApi;
pub use regions::RegionsApi;
pub use system::SystemApi;

use poem_openapi::OpenApi;

/// Combines all API modules into a single OpenAPI specification
pub fn create_combined_api() -> impl OpenApi {
    (SystemApi, PageApi, RegionsApi, CardsApi, ConsentApi)
}
