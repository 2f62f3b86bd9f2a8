//! Names of the Elasticsearch objects the lab creates.

use chrono::NaiveDate;

pub const DEFAULT_DATA_STREAM: &str = "logs-filestream.generic-default";
pub const ILM_POLICY: &str = "logs";
pub const PACKAGE_COMPONENT_TEMPLATE: &str = "logs@package";
pub const CUSTOM_COMPONENT_TEMPLATE: &str = "logs@custom";

/// Index template named after the data stream it backs.
pub fn index_template_name(data_stream: &str) -> String {
    data_stream.to_string()
}

/// Pattern covering every namespace of the stream's dataset:
/// `logs-filestream.generic-default` becomes `logs-filestream.generic-*`.
pub fn index_pattern(data_stream: &str) -> String {
    match data_stream.rsplit_once('-') {
        Some((dataset, _namespace)) => format!("{dataset}-*"),
        None => format!("{data_stream}*"),
    }
}

/// `.ds-<stream>-<yyyy.MM.dd>-<generation:06>`, the layout Elasticsearch uses.
pub fn backing_index_name(data_stream: &str, date: NaiveDate, generation: u64) -> String {
    format!(
        ".ds-{}-{}-{:06}",
        data_stream,
        date.format("%Y.%m.%d"),
        generation
    )
}

/// Prefix shared by every backing index of the stream.
pub fn backing_index_prefix(data_stream: &str) -> String {
    format!(".ds-{data_stream}-")
}

pub fn is_backing_index_of(index: &str, data_stream: &str) -> bool {
    index.starts_with(&backing_index_prefix(data_stream))
}

/// Generation suffix of a backing index name, if it has one.
pub fn generation_of(index: &str) -> Option<u64> {
    let (_, tail) = index.rsplit_once('-')?;
    if tail.len() != 6 {
        return None;
    }
    tail.parse().ok()
}

/// Operator-created component templates removed on reset.
pub fn is_custom_component_template(name: &str) -> bool {
    name.starts_with(CUSTOM_COMPONENT_TEMPLATE)
}
