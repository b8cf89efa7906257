use serde_json::json;
use vrtoolkit::config::PipelineConfig;

fn main() {
    let config = PipelineConfig::default();
    println!("{:#}", json!(config));
}
