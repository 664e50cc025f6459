use axum::Router;
use utoipa::{
    Modify,
    openapi::{
        InfoBuilder, OpenApi,
        security::{Http, HttpAuthScheme, SecurityScheme},
    },
};
use utoipa_swagger_ui::SwaggerUi;

pub const OPENAPI_JSON_PATH: &str = "/api-docs/openapi.json";

/// Registers the `bearerAuth` scheme referenced by protected handlers.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearerAuth",
            SecurityScheme::Http(
                Http::builder()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

/// Titles the collected document and adds the security scheme.
pub fn finalize(mut openapi: OpenApi, title: &str) -> OpenApi {
    openapi.info = InfoBuilder::new()
        .title(title)
        .version(env!("CARGO_PKG_VERSION"))
        .build();
    SecurityAddon.modify(&mut openapi);
    openapi
}

pub fn create_swagger_ui<S>(openapi: OpenApi) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::from(SwaggerUi::new("/swagger-ui").url(OPENAPI_JSON_PATH, openapi))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_scheme_is_registered() {
        let openapi = finalize(OpenApi::default(), "Test API");
        assert_eq!(openapi.info.title, "Test API");
        let components = openapi.components.unwrap();
        assert!(components.security_schemes.contains_key("bearerAuth"));
    }
}
