//! HTTP request handlers

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::{
    extract::{Form, State},
    response::Html,
    Json,
};
use serde::Deserialize;
use tracing::{debug, info};

use crate::preprocessing::{DiamondFeatures, FeatureRecord, FeatureSchema, FieldKind, FieldValue};

use super::error::{Result, ServerError};
use super::state::AppState;

// ============================================================================
// Inference API
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    rows: Vec<FeatureRecord>,
}

pub async fn predict(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<serde_json::Value>> {
    if request.rows.is_empty() {
        return Err(ServerError::BadRequest("rows array is empty".to_string()));
    }

    let predictor = state.predictor.clone();
    let rows = request.rows;
    let prediction = tokio::task::spawn_blocking(move || predictor.predict_rows(&rows)).await??;
    debug!(count = prediction.prices.len(), source = %prediction.source, "API prediction served");

    Ok(Json(serde_json::json!({
        "success": true,
        "predictions": prediction.prices,
        "count": prediction.prices.len(),
        "source": prediction.source,
        "fallback_reason": prediction.fallback_reason,
    })))
}

pub async fn model_info(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>> {
    let resolved = state.resolve_model().await?;
    let model = &resolved.model;
    let pipeline = resolved.pipeline();
    let importances: Vec<serde_json::Value> = pipeline
        .feature_importances()
        .into_iter()
        .filter(|(_, v)| *v > 0.0)
        .take(10)
        .map(|(name, v)| serde_json::json!({ "feature": name, "importance": v }))
        .collect();
    let preprocessor = pipeline.preprocessor();
    let categories: serde_json::Map<String, serde_json::Value> = preprocessor
        .categorical_columns()
        .into_iter()
        .map(|column| {
            let learned = preprocessor.categories(column).unwrap_or_default();
            (column.to_string(), serde_json::json!(learned))
        })
        .collect();

    Ok(Json(serde_json::json!({
        "source": resolved.source,
        "fallback_reason": resolved.fallback_reason,
        "created_at": model.created_at,
        "params": model.params,
        "metrics": model.metrics,
        "tree_depth": pipeline.tree_depth(),
        "n_leaves": pipeline.n_leaves(),
        "n_features_out": preprocessor.n_features_out(),
        "categories": categories,
        "feature_importances": importances,
        "cache": state.cache().stats(),
    })))
}

pub async fn evict_model_cache(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let evicted = state.cache().clear();
    info!(evicted, "Model cache cleared");
    Json(serde_json::json!({
        "success": true,
        "evicted": evicted,
    }))
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.uptime_secs(),
        "cache": state.cache().stats(),
    }))
}

// ============================================================================
// UI Handlers
// ============================================================================

enum Outcome {
    Price(f64),
    Error(String),
}

fn default_values() -> BTreeMap<String, String> {
    DiamondFeatures::default()
        .to_record()
        .into_iter()
        .map(|(k, v)| (k, v.to_string()))
        .collect()
}

/// Parse submitted form fields into a typed record; the message names the offending field
fn record_from_form(
    schema: &FeatureSchema,
    form: &HashMap<String, String>,
) -> std::result::Result<FeatureRecord, String> {
    let mut record = FeatureRecord::new();
    for field in schema.fields() {
        let raw = form
            .get(&field.name)
            .map(|s| s.trim())
            .ok_or_else(|| format!("missing field '{}'", field.name))?;
        let value = match field.kind {
            FieldKind::Numeric { .. } => raw
                .parse::<f64>()
                .map(FieldValue::Number)
                .map_err(|_| format!("'{}' must be a number, got '{}'", field.name, raw))?,
            FieldKind::Categorical { .. } => FieldValue::Text(raw.to_string()),
        };
        record.insert(field.name.clone(), value);
    }
    Ok(record)
}

async fn model_source_label(state: &AppState) -> String {
    match state.resolve_model().await {
        Ok(resolved) => match resolved.fallback_reason {
            Some(reason) => format!("{} (registry unavailable: {})", resolved.source, reason),
            None => resolved.source.to_string(),
        },
        Err(e) => format!("no model loaded: {}", e),
    }
}

pub async fn serve_index(State(state): State<Arc<AppState>>) -> Html<String> {
    let source = model_source_label(&state).await;
    Html(render_page(&FeatureSchema::diamonds(), &default_values(), &source, None))
}

pub async fn predict_form(
    State(state): State<Arc<AppState>>,
    Form(form): Form<HashMap<String, String>>,
) -> Html<String> {
    let schema = FeatureSchema::diamonds();
    let mut values = default_values();
    for (k, v) in &form {
        if schema.field(k).is_some() {
            values.insert(k.clone(), v.clone());
        }
    }

    let outcome = match record_from_form(&schema, &form) {
        Err(msg) => Outcome::Error(msg),
        Ok(record) => {
            let predictor = state.predictor.clone();
            match tokio::task::spawn_blocking(move || predictor.predict_rows(&[record])).await {
                Ok(Ok(prediction)) => match prediction.prices.first() {
                    Some(price) => Outcome::Price(*price),
                    None => Outcome::Error("no prediction returned".to_string()),
                },
                Ok(Err(e)) => Outcome::Error(e.to_string()),
                Err(e) => Outcome::Error(format!("prediction task failed: {}", e)),
            }
        }
    };

    let source = model_source_label(&state).await;
    Html(render_page(&schema, &values, &source, Some(&outcome)))
}

fn render_page(
    schema: &FeatureSchema,
    values: &BTreeMap<String, String>,
    source: &str,
    outcome: Option<&Outcome>,
) -> String {
    use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};

    let mut inputs = String::new();
    for field in schema.fields() {
        let current = values.get(&field.name).map(String::as_str).unwrap_or("");
        inputs.push_str(&format!(
            "<label for=\"{name}\">{name}</label>",
            name = attr(&field.name)
        ));
        match &field.kind {
            FieldKind::Numeric { min, max } => inputs.push_str(&format!(
                "<input type=\"number\" id=\"{name}\" name=\"{name}\" min=\"{min}\" max=\"{max}\" step=\"0.01\" value=\"{value}\">\n",
                name = attr(&field.name),
                value = attr(current),
            )),
            FieldKind::Categorical { vocabulary } => {
                inputs.push_str(&format!("<select id=\"{name}\" name=\"{name}\">", name = attr(&field.name)));
                for option in vocabulary {
                    let selected = if option == current { " selected" } else { "" };
                    inputs.push_str(&format!(
                        "<option value=\"{v}\"{selected}>{label}</option>",
                        v = attr(option),
                        label = text(option),
                    ));
                }
                inputs.push_str("</select>\n");
            }
        }
    }

    let result = match outcome {
        Some(Outcome::Price(price)) => format!(
            "<p class=\"result\">Predicted price: <strong>${:.2}</strong></p>",
            price
        ),
        Some(Outcome::Error(msg)) => format!("<p class=\"error\">{}</p>", text(msg)),
        None => String::new(),
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Diamond Price Predictor</title>
    <style>body{{font-family:sans-serif;max-width:32rem;margin:2rem auto}}label{{display:block;margin-top:.5rem}}.error{{color:#b00}}.source{{color:#666;font-size:.85rem}}</style>
</head>
<body>
    <h1>Diamond Price Predictor</h1>
    <p class="source">Model: {source}</p>
    <form method="post" action="/predict">
{inputs}        <button type="submit">Predict price</button>
    </form>
    {result}
</body>
</html>
"#,
        source = text(source),
        inputs = inputs,
        result = result,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_from_form() {
        let schema = FeatureSchema::diamonds();
        let mut form: HashMap<String, String> = default_values().into_iter().collect();
        let record = record_from_form(&schema, &form).unwrap();
        assert_eq!(record.len(), 9);
        assert_eq!(record["carat"].as_number(), Some(0.7));

        form.insert("carat".into(), "heavy".into());
        let msg = record_from_form(&schema, &form).unwrap_err();
        assert!(msg.contains("carat"));

        form.remove("cut");
        assert!(record_from_form(&schema, &form).is_err());
    }

    #[test]
    fn test_render_page_escapes() {
        let html = render_page(
            &FeatureSchema::diamonds(),
            &default_values(),
            "<script>",
            Some(&Outcome::Error("<b>bad</b>".into())),
        );
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;b&gt;bad&lt;/b&gt;"));
        assert!(html.contains("<option value=\"Premium\" selected>"));
        assert!(html.contains("name=\"carat\""));
    }

    #[test]
    fn test_render_price() {
        let html = render_page(
            &FeatureSchema::diamonds(),
            &default_values(),
            "local file m.bin",
            Some(&Outcome::Price(2816.456)),
        );
        assert!(html.contains("$2816.46"));
    }
}
