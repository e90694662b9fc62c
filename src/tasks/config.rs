use std::fs;

use anyhow::Context;
use serde_json::Value;

use crate::angular;
use crate::error::ConfigError;
use crate::TaskContext;

use super::write;

/// Turns the settings of the selected environment into the
/// `<name>.config` constants module.
pub(super) fn config(ctx: &TaskContext<'_>) -> anyhow::Result<()> {
    let project = ctx.project();
    let file = project.environment_file();
    let path = project.path(&file);

    let text = fs::read_to_string(&path).map_err(|e| ConfigError::Read(path.clone(), e))?;
    let settings: Value =
        serde_json::from_str(&text).map_err(|e| ConfigError::Json(path.clone(), e))?;
    let Value::Object(constants) = settings else {
        return Err(ConfigError::NotAnObject(path).into());
    };

    let module = angular::constants_module(&format!("{}.config", project.name), &constants);
    let out = project.paths().src.join("constant.config.js");

    write(ctx, &out, module).with_context(|| format!("Couldn't write constants from {file}"))?;

    tracing::info!(environment = %project.environment, constants = constants.len(), "wrote {out}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::fixture::{self, Fixture};
    use super::*;

    fn project() -> Fixture {
        Fixture::new(&[
            ("bower.json", r#"{"name": "cv"}"#),
            (
                "config/development.json",
                r#"{"apiUrl": "http://localhost:3000", "debug": true}"#,
            ),
            ("config/production.json", r#"{"apiUrl": "/api"}"#),
        ])
    }

    #[test]
    fn test_development_by_default() {
        let fixture = project();
        fixture::run(&fixture.env(None), "config", config).unwrap();

        assert_eq!(
            fixture.read("src/app/constant.config.js"),
            "angular.module('cv.config', [])\n\n\
             .constant('apiUrl', \"http://localhost:3000\")\n\n\
             .constant('debug', true)\n\n\
             ;\n"
        );
    }

    #[test]
    fn test_selected_environment() {
        let fixture = project();
        fixture::run(&fixture.env(Some("production")), "config", config).unwrap();

        let module = fixture.read("src/app/constant.config.js");
        assert!(module.contains(".constant('apiUrl', \"/api\")"));
        assert!(!module.contains("debug"));
    }

    #[test]
    fn test_missing_environment_fails() {
        let fixture = project();
        let err = fixture::run(&fixture.env(Some("staging")), "config", config).unwrap_err();

        assert!(format!("{err:#}").contains("staging.json"));
        assert!(!fixture.exists("src/app/constant.config.js"));
    }

    #[test]
    fn test_settings_must_be_an_object() {
        let fixture = Fixture::new(&[("config/development.json", "[1, 2]")]);
        let err = fixture::run(&fixture.env(None), "config", config).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::NotAnObject(_))
        ));
    }
}
