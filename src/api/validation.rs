use actix_web::{error::InternalError, HttpResponse};
use serde::Serialize;
use serde_json::{json, Map, Value};

/// JSON error body shared by every endpoint
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub fields: Value,
}

fn bad_request(error: &str, fields: Map<String, Value>) -> actix_web::Error {
    InternalError::from_response(
        "",
        HttpResponse::BadRequest().json(ErrorResponse {
            error: error.to_string(),
            fields: Value::Object(fields),
        }),
    )
    .into()
}

/// Creates a configured JsonConfig with standardized error handling for the entire project
pub fn json_config() -> actix_web_validator::JsonConfig {
    actix_web_validator::JsonConfig::default().error_handler(|err, _req| {
        let mut fields = Map::new();

        match err {
            actix_web_validator::Error::Validate(validation_errors) => {
                for (field, errors) in validation_errors.field_errors() {
                    let messages: Vec<String> = errors
                        .iter()
                        .map(|e| {
                            e.message
                                .as_ref()
                                .map(|m| m.to_string())
                                .unwrap_or_else(|| format!("Invalid value for {}", field))
                        })
                        .collect();
                    fields.insert(field.to_string(), json!({ "errors": messages }));
                }
                bad_request("Validation failed", fields)
            }
            actix_web_validator::Error::Deserialize(de_err) => {
                let err_string = de_err.to_string();

                let message = if err_string.contains("EOF while parsing") {
                    "Request body is empty. Expected JSON payload"
                } else if err_string.contains("invalid type") {
                    "maxJobs must be a number and skipDuplicates a boolean"
                } else {
                    "Invalid JSON format"
                };
                fields.insert("message".to_string(), json!(message));
                bad_request("Request validation failed", fields)
            }
            _ => {
                fields.insert("message".to_string(), json!("Validation error"));
                bad_request("Validation failed", fields)
            }
        }
    })
}
