//! Validation stage: template lookup, parameter schema checks, default
//! merging and stage timeouts.

use super::{ProvisioningTask, TemplateInputs};
use crate::error::StageError;
use crate::merge::{self, ConfigurationError};
use crate::schema;
use crate::template_params::TemplateParameterKind;
use crate::timeouts::{
    timeout_from_config, StageTimeouts, DEFAULT_HARDWARE_PROVISIONING_TIMEOUT, HARDWARE_PROVISIONING_TIMEOUT_KEY,
};
use crds::{ClusterTemplate, ConditionType, TEMPLATE_PARAM_CLUSTER_NAME, TEMPLATE_PARAM_SITE_ID};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

impl ProvisioningTask<'_> {
    pub(super) async fn handle_validation(&mut self) -> Result<(), StageError> {
        debug!("Validating ProvisioningRequest {}", self.name);
        let result = self.validate_provisioning_request().await;
        self.record_stage(
            ConditionType::Validated,
            &result,
            "The provisioning request validation succeeded",
            "Failed to validate the ProvisioningRequest",
        );
        result
    }

    async fn validate_provisioning_request(&mut self) -> Result<(), StageError> {
        let template = self.find_valid_template().await?;
        let namespace = template.metadata.namespace.clone().unwrap_or_default();

        let parameters = &self.request.spec.template_parameters;
        if !parameters.is_object() {
            return Err(StageError::input("templateParameters must be a mapping"));
        }
        schema::validate(&template.spec.template_parameter_schema, parameters)
            .map_err(|e| StageError::input(format!("failed to validate templateParameters: {e}")))?;
        for key in [TEMPLATE_PARAM_CLUSTER_NAME, TEMPLATE_PARAM_SITE_ID] {
            if self.request.spec.string_parameter(key).is_none_or(str::is_empty) {
                return Err(StageError::input(format!("templateParameters.{key} must be a non-empty string")));
            }
        }

        let mut timeouts = StageTimeouts::default();
        let mut cluster_data = Value::Null;
        let mut policy_data = Value::Null;
        for kind in TemplateParameterKind::ALL {
            let config_map = kind.defaults_config_map(&template.spec.templates);
            let data = self.load_config_map(&namespace, config_map).await?;
            let merged = self.merge_with_defaults(kind, &template, config_map, &data)?;
            let timeout = timeout_from_config(&data, kind.timeout_key(), kind.default_timeout())?;
            match kind {
                TemplateParameterKind::ClusterInstance => {
                    cluster_data = merged;
                    timeouts.cluster_installation = timeout;
                }
                TemplateParameterKind::PolicyTemplate => {
                    policy_data = merged;
                    timeouts.cluster_configuration = timeout;
                }
            }
        }

        let hardware_template = self.load_config_map(&namespace, &template.spec.templates.hw_template).await?;
        timeouts.hardware_provisioning = timeout_from_config(
            &hardware_template,
            HARDWARE_PROVISIONING_TIMEOUT_KEY,
            DEFAULT_HARDWARE_PROVISIONING_TIMEOUT,
        )?;

        debug!("Resolved timeouts for ProvisioningRequest {}: {:?}", self.name, timeouts);
        self.timeouts = timeouts;
        self.inputs = Some(TemplateInputs {
            template,
            namespace,
            cluster_data,
            policy_data,
            hardware_template,
        });
        Ok(())
    }

    async fn find_valid_template(&self) -> Result<ClusterTemplate, StageError> {
        let object_name = self.request.spec.template_ref().object_name();
        let template = self
            .backend
            .find_cluster_template(&object_name)
            .await?
            .ok_or_else(|| StageError::input(format!("failed to get ClusterTemplate {object_name}: not found")))?;
        if !template.is_validated() {
            return Err(StageError::input(format!(
                "the referenced ClusterTemplate ({object_name}) is not valid"
            )));
        }
        Ok(template)
    }

    /// Merges the user block of `kind` over its template defaults and checks
    /// it against the matching part of the parameter schema.
    fn merge_with_defaults(
        &self,
        kind: TemplateParameterKind,
        template: &ClusterTemplate,
        config_map: &str,
        data: &BTreeMap<String, String>,
    ) -> Result<Value, StageError> {
        let input = self.request.spec.template_parameter(kind.parameter_key()).cloned().unwrap_or(Value::Null);
        let sub_schema = schema::property_schema(&template.spec.template_parameter_schema, kind.parameter_key());

        if kind.validates_raw_input() {
            if let Some(sub_schema) = sub_schema {
                let mut strict = sub_schema.clone();
                schema::disallow_unknown_fields(&mut strict);
                schema::validate(&strict, &input).map_err(|e| {
                    StageError::input(format!(
                        "the provided {kind} does not match the schema from ClusterTemplate ({}): {e}",
                        template.spec.name
                    ))
                })?;
            }
        }

        let key = kind.defaults_key();
        let raw = data
            .get(key)
            .ok_or_else(|| StageError::input(format!("ConfigMap {config_map} does not contain the {key} key")))?;
        let defaults: Value = serde_yaml::from_str(raw).map_err(|e| {
            StageError::input(format!("the value of key {key} from ConfigMap {config_map} is not a valid YAML document: {e}"))
        })?;

        let merged = match merge::merge(&defaults, &input) {
            Ok(merged) => merged,
            Err(ConfigurationError::MissingInput) if !kind.requires_data() => Value::Object(Map::new()),
            Err(e) => return Err(StageError::from(e).context(format!("failed to merge data for {kind}"))),
        };

        if !kind.validates_raw_input() {
            if let Some(sub_schema) = sub_schema {
                schema::validate(sub_schema, &merged)
                    .map_err(|e| StageError::input(format!("failed to validate merged {kind} data: {e}")))?;
            }
        }
        Ok(merged)
    }
}
