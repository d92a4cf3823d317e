use std::fs;
use std::path::PathBuf;

use query_engine_metadata::metadata::Registry;
use query_engine_sql::sql;
use query_engine_translation::translation;
use tsql_graph_configuration::environment::FixedEnvironment;

/// Read the shared entity configuration into a registry.
pub async fn registry() -> anyhow::Result<Registry> {
    let _ = env_logger::builder().is_test(true).try_init();

    let directory = PathBuf::from("tests/goldenfiles/configuration");
    let parsed_configuration = tsql_graph_configuration::parse_configuration(&directory).await?;
    let configuration = tsql_graph_configuration::make_runtime_configuration(
        parsed_configuration,
        FixedEnvironment::from([(
            tsql_graph_configuration::DEFAULT_CONNECTION_URI_VARIABLE.into(),
            "the translation tests do not rely on a database connection".into(),
        )]),
    )?;
    Ok(Registry::from_metadata(&configuration.metadata))
}

fn read_request<T: serde::de::DeserializeOwned>(testname: &str) -> anyhow::Result<T> {
    let path = PathBuf::from("tests/goldenfiles").join(format!("{testname}.json"));
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}

/// Translate a request and render its SQL, followed by the declarations of
/// the parameters it binds.
pub async fn test_translation(testname: &str) -> anyhow::Result<String> {
    let registry = registry().await?;
    let request: translation::request::QueryRequest = read_request(testname)?;
    let plan = translation::query::translate(&registry, &request)?;
    Ok(render(&plan.query_sql()))
}

/// As `test_translation`, for a count request.
pub async fn test_count_translation(testname: &str) -> anyhow::Result<String> {
    let registry = registry().await?;
    let request: translation::query::CountRequest = read_request(testname)?;
    let plan = translation::query::translate_count(&registry, &request)?;
    Ok(render(&plan.query_sql()))
}

fn render(query: &sql::string::SQL) -> String {
    let mut rendered = mask_cte_names(&query.sql);
    for declaration in query.declarations() {
        rendered.push('\n');
        rendered.push_str(&declaration);
    }
    rendered
}

/// Common table expressions are named `cte_<uuid>`; replace the names with `cte`.
fn mask_cte_names(sql: &str) -> String {
    let mut result = String::with_capacity(sql.len());
    let mut rest = sql;
    while let Some(start) = rest.find("[cte_") {
        result.push_str(&rest[..start]);
        result.push_str("[cte]");
        rest = &rest[start..];
        let end = rest.find(']').map_or(rest.len(), |end| end + 1);
        rest = &rest[end..];
    }
    result.push_str(rest);
    result
}
