//! Cascading brand → model → year → stage resolution
//!
//! Each level is looked up by display name in the list fetched for the level
//! above it, so the cache key of every level depends on the upstream id
//! resolved one step earlier. A miss at any level stops the cascade.

use tracing::debug;

use super::catalog::{CatalogClient, CatalogEntity, CatalogError, StageRecord};
use super::TuningData;

/// Substring marking the baseline stage
const ECO_TOKEN: &str = "ECO";
/// Substring marking a Stage 1 remap
const STAGE1_TOKEN: &str = "STAGE 1";
/// Substring marking a Stage 2 remap
const STAGE2_TOKEN: &str = "STAGE 2";

/// The stage rows picked out for one engine
///
/// Each slot holds the first stage whose title contains the matching token,
/// compared case-insensitively. Slots are filled independently, so a title
/// like "Stage 1 Eco" lands in both `eco` and `stage1`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassifiedStages<'a> {
    pub eco: Option<&'a StageRecord>,
    pub stage1: Option<&'a StageRecord>,
    pub stage2: Option<&'a StageRecord>,
}

/// Sorts an engine's stage rows into ECO / Stage 1 / Stage 2
pub fn classify_stages(stages: &[StageRecord]) -> ClassifiedStages<'_> {
    let first_with = |token: &str| {
        stages.iter().find(|stage| {
            stage
                .title()
                .is_some_and(|title| title.to_uppercase().contains(token))
        })
    };

    ClassifiedStages {
        eco: first_with(ECO_TOKEN),
        stage1: first_with(STAGE1_TOKEN),
        stage2: first_with(STAGE2_TOKEN),
    }
}

/// Turns classified stage rows into tuning figures
///
/// Returns `None` when there is neither an ECO nor a Stage 1 row. Stock
/// figures come from the ECO row's snapshot, then the Stage 1 row's, then 0.
/// Stage 2 figures stay `None` unless a Stage 2 row exists.
pub fn build_tuning_data(stages: &ClassifiedStages<'_>) -> Option<TuningData> {
    if stages.eco.is_none() && stages.stage1.is_none() {
        return None;
    }

    let eco = stages.eco.and_then(|s| s.parent.as_ref());
    let stage1 = stages.stage1.and_then(|s| s.parent.as_ref());
    let stage2 = stages.stage2.and_then(|s| s.parent.as_ref());

    Some(TuningData {
        original_power: eco
            .and_then(|p| p.int_hp)
            .or_else(|| stage1.and_then(|p| p.int_hp))
            .unwrap_or(0),
        original_torque: eco
            .and_then(|p| p.int_nm)
            .or_else(|| stage1.and_then(|p| p.int_nm))
            .unwrap_or(0),
        stage1_power: stage1.and_then(|p| p.int_hp_new).unwrap_or(0),
        stage1_torque: stage1.and_then(|p| p.int_nm_new).unwrap_or(0),
        stage2_power: stage2.map(|p| p.int_hp_new.unwrap_or(0)),
        stage2_torque: stage2.map(|p| p.int_nm_new.unwrap_or(0)),
    })
}

/// Resolves vehicles against the remote catalog, one level at a time
#[derive(Debug, Clone)]
pub struct CascadingResolver {
    client: CatalogClient,
}

impl CascadingResolver {
    pub fn new(client: CatalogClient) -> Self {
        Self { client }
    }

    /// The catalog client used for every level
    pub fn client(&self) -> &CatalogClient {
        &self.client
    }

    /// Display names of all brands
    pub async fn brands(&self) -> Result<Vec<String>, CatalogError> {
        let brands = self.client.fetch_brands().await?;
        Ok(display_names(&brands))
    }

    /// Display names of the models of `brand`
    pub async fn models(&self, brand: &str) -> Result<Vec<String>, CatalogError> {
        let brand = self.find_brand(brand).await?;
        let models = self.client.fetch_models(brand.id).await?;
        Ok(display_names(&models))
    }

    /// Generation (year) labels of `brand` `model`
    pub async fn generations(&self, brand: &str, model: &str) -> Result<Vec<String>, CatalogError> {
        let model = self.find_model(brand, model).await?;
        let years = self.client.fetch_years(model.id).await?;
        Ok(display_names(&years))
    }

    /// Distinct engine labels offered for a generation, in catalog order
    pub async fn engines(
        &self,
        brand: &str,
        model: &str,
        generation: &str,
    ) -> Result<Vec<String>, CatalogError> {
        let year = self.find_year(brand, model, generation).await?;
        let stages = self.client.fetch_stages(year.id).await?;

        let mut engines: Vec<String> = Vec::new();
        for engine in stages.iter().filter_map(StageRecord::engine) {
            if !engines.iter().any(|known| known == engine) {
                engines.push(engine.to_string());
            }
        }
        Ok(engines)
    }

    /// Resolves tuning figures for one engine
    ///
    /// # Returns
    /// * `Ok(Some(TuningData))` - figures were found
    /// * `Ok(None)` - the path exists but the catalog has no usable tuning
    ///   rows for this engine
    /// * `Err(CatalogError)` - a level of the path was not found or the
    ///   catalog could not be read
    pub async fn resolve(
        &self,
        brand: &str,
        model: &str,
        generation: &str,
        engine: &str,
    ) -> Result<Option<TuningData>, CatalogError> {
        let year = self.find_year(brand, model, generation).await?;
        let stages: Vec<StageRecord> = self
            .client
            .fetch_stages(year.id)
            .await?
            .into_iter()
            .filter(|stage| stage.parent.as_ref().is_some_and(|p| p.label.matches_exact(engine)))
            .collect();

        if stages.is_empty() {
            debug!(brand, model, generation, engine, "no stages for engine");
            return Ok(None);
        }

        let data = build_tuning_data(&classify_stages(&stages));
        debug!(brand, model, generation, engine, found = data.is_some(), "stages classified");
        Ok(data)
    }

    async fn find_brand(&self, brand: &str) -> Result<CatalogEntity, CatalogError> {
        self.client
            .fetch_brands()
            .await?
            .into_iter()
            .find(|b| b.label.matches_ignore_case(brand))
            .ok_or_else(|| CatalogError::BrandNotFound {
                brand: brand.to_string(),
            })
    }

    async fn find_model(&self, brand: &str, model: &str) -> Result<CatalogEntity, CatalogError> {
        let found = self.find_brand(brand).await?;
        self.client
            .fetch_models(found.id)
            .await?
            .into_iter()
            .find(|m| m.label.matches_ignore_case(model))
            .ok_or_else(|| CatalogError::ModelNotFound {
                brand: brand.to_string(),
                model: model.to_string(),
            })
    }

    /// Year labels are compared exactly; upstream treats them as tokens
    async fn find_year(
        &self,
        brand: &str,
        model: &str,
        generation: &str,
    ) -> Result<CatalogEntity, CatalogError> {
        let found = self.find_model(brand, model).await?;
        self.client
            .fetch_years(found.id)
            .await?
            .into_iter()
            .find(|y| y.label.matches_exact(generation))
            .ok_or_else(|| CatalogError::YearNotFound {
                brand: brand.to_string(),
                model: model.to_string(),
                generation: generation.to_string(),
            })
    }
}

fn display_names(entities: &[CatalogEntity]) -> Vec<String> {
    entities
        .iter()
        .filter_map(CatalogEntity::display_name)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::catalog::{EntityName, PowerSnapshot};
    use serde_json::{json, Value};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn stage(
        title: &str,
        engine: &str,
        hp: Option<u32>,
        nm: Option<u32>,
        hp_new: Option<u32>,
        nm_new: Option<u32>,
    ) -> StageRecord {
        StageRecord {
            id: 0,
            label: EntityName {
                name: Some(title.to_string()),
                var_title: None,
            },
            parent: Some(PowerSnapshot {
                label: EntityName {
                    name: Some(engine.to_string()),
                    var_title: None,
                },
                int_hp: hp,
                int_nm: nm,
                int_hp_new: hp_new,
                int_nm_new: nm_new,
            }),
            parent_id: None,
        }
    }

    async fn mount(server: &MockServer, resource: &str, param: Option<(&str, &str)>, body: Value, times: u64) {
        let mut mock = Mock::given(method("GET")).and(path(format!("/{}", resource)));
        if let Some((name, value)) = param {
            mock = mock.and(query_param(name, value));
        }
        mock.respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(times)
            .mount(server)
            .await;
    }

    /// Mounts the Audi / A4 / B9 path, each level expected `times` times
    async fn mount_audi_path(server: &MockServer, times: u64) {
        mount(server, "brands", None, json!([{"id": 1, "name": "Audi"}, {"id": 2, "name": "BMW"}]), times).await;
        mount(server, "models", Some(("brand_id", "1")), json!([{"id": 10, "var_title": "A4"}]), times).await;
        mount(server, "years", Some(("model_id", "10")), json!([{"id": 100, "name": "B9 (2015-2023)"}]), times).await;
        mount(
            server,
            "stages",
            Some(("year_id", "100")),
            json!([
                {"id": 1000, "name": "ECO", "parent": {"name": "2.0 TDI", "int_hp": 150, "int_nm": 320}},
                {"id": 1001, "name": "STAGE 1", "parent": {"name": "2.0 TDI", "int_hp": 150, "int_nm": 320, "int_hp_new": 185, "int_nm_new": 400}},
                {"id": 1002, "name": "STAGE 1", "parent": {"name": "3.0 TDI", "int_hp": 272, "int_nm": 600, "int_hp_new": 320, "int_nm_new": 700}},
                {"id": 1003, "name": "STAGE 2", "parent": {"name": "3.0 TDI", "int_hp": 272, "int_nm": 600, "int_hp_new": 350, "int_nm_new": 750}}
            ]),
            times,
        )
        .await;
    }

    fn resolver_for(server: &MockServer) -> CascadingResolver {
        CascadingResolver::new(CatalogClient::new(server.uri(), "test-key"))
    }

    #[test]
    fn test_classify_is_case_insensitive() {
        let stages = vec![
            stage("eco", "1.6", Some(100), Some(200), None, None),
            stage("Stage 1", "1.6", Some(100), Some(200), Some(120), Some(240)),
            stage("stage 2+", "1.6", Some(100), Some(200), Some(130), Some(260)),
        ];

        let classified = classify_stages(&stages);

        assert_eq!(classified.eco.unwrap().title(), Some("eco"));
        assert_eq!(classified.stage1.unwrap().title(), Some("Stage 1"));
        assert_eq!(classified.stage2.unwrap().title(), Some("stage 2+"));
    }

    #[test]
    fn test_classify_fills_slots_independently() {
        let stages = vec![stage("Stage 1 Eco", "1.6", Some(100), Some(200), Some(120), Some(240))];

        let classified = classify_stages(&stages);

        assert!(classified.eco.is_some());
        assert!(classified.stage1.is_some());
        assert!(classified.stage2.is_none());
    }

    #[test]
    fn test_build_without_eco_or_stage1_is_none() {
        let stages = vec![stage("STAGE 2", "1.6", Some(100), Some(200), Some(140), Some(280))];

        assert!(build_tuning_data(&classify_stages(&stages)).is_none());
    }

    #[test]
    fn test_build_falls_back_to_stage1_baseline() {
        let stages = vec![stage("STAGE 1", "1.6", Some(110), Some(210), Some(130), None)];

        let data = build_tuning_data(&classify_stages(&stages)).unwrap();

        assert_eq!(data.original_power, 110);
        assert_eq!(data.original_torque, 210);
        assert_eq!(data.stage1_power, 130);
        assert_eq!(data.stage1_torque, 0, "Missing new torque defaults to 0");
        assert_eq!(data.stage2_power, None);
    }

    #[test]
    fn test_build_with_eco_only_has_zero_stage1() {
        let stages = vec![stage("ECO", "1.6", Some(90), Some(180), None, None)];

        let data = build_tuning_data(&classify_stages(&stages)).unwrap();

        assert_eq!(data.original_power, 90);
        assert_eq!(data.stage1_power, 0);
        assert_eq!(data.stage1_torque, 0);
    }

    #[test]
    fn test_build_with_stage2_row_reports_stage2() {
        let stages = vec![
            stage("STAGE 1", "3.0", Some(272), Some(600), Some(320), Some(700)),
            stage("STAGE 2", "3.0", Some(272), Some(600), None, Some(750)),
        ];

        let data = build_tuning_data(&classify_stages(&stages)).unwrap();

        assert_eq!(data.stage2_power, Some(0));
        assert_eq!(data.stage2_torque, Some(750));
    }

    #[tokio::test]
    async fn test_resolve_eco_and_stage1_without_stage2() {
        let server = MockServer::start().await;
        mount_audi_path(&server, 1).await;

        let data = resolver_for(&server)
            .resolve("audi", "a4", "B9 (2015-2023)", "2.0 TDI")
            .await
            .unwrap()
            .expect("tuning data");

        assert_eq!(
            data,
            TuningData {
                original_power: 150,
                original_torque: 320,
                stage1_power: 185,
                stage1_torque: 400,
                stage2_power: None,
                stage2_torque: None,
            }
        );
    }

    #[tokio::test]
    async fn test_resolve_twice_calls_each_level_once() {
        let server = MockServer::start().await;
        mount_audi_path(&server, 1).await;

        let resolver = resolver_for(&server);
        let first = resolver.resolve("Audi", "A4", "B9 (2015-2023)", "3.0 TDI").await.unwrap();
        let second = resolver.resolve("AUDI", "A4", "B9 (2015-2023)", "3.0 TDI").await.unwrap();

        assert_eq!(first, second);
        let data = first.unwrap();
        assert_eq!(data.original_power, 272);
        assert_eq!(data.stage2_power, Some(350));
        assert_eq!(data.stage2_torque, Some(750));
    }

    #[tokio::test]
    async fn test_unknown_engine_is_none_not_error() {
        let server = MockServer::start().await;
        mount_audi_path(&server, 1).await;

        let result = resolver_for(&server)
            .resolve("Audi", "A4", "B9 (2015-2023)", "1.4 TFSI")
            .await
            .unwrap();

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_brand_failure_short_circuits() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/brands"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;
        mount(&server, "models", None, json!([]), 0).await;
        mount(&server, "years", None, json!([]), 0).await;
        mount(&server, "stages", None, json!([]), 0).await;

        let err = resolver_for(&server)
            .resolve("Audi", "A4", "B9 (2015-2023)", "2.0 TDI")
            .await
            .unwrap_err();

        assert!(matches!(err, CatalogError::Status(500)));
    }

    #[tokio::test]
    async fn test_unknown_brand_is_reported() {
        let server = MockServer::start().await;
        mount(&server, "brands", None, json!([{"id": 1, "name": "Audi"}]), 1).await;
        mount(&server, "models", None, json!([]), 0).await;

        let err = resolver_for(&server).models("Lada").await.unwrap_err();

        assert_eq!(err.to_string(), "Brand \"Lada\" not found");
    }

    #[tokio::test]
    async fn test_unknown_model_is_reported() {
        let server = MockServer::start().await;
        mount(&server, "brands", None, json!([{"id": 1, "name": "Audi"}]), 1).await;
        mount(&server, "models", Some(("brand_id", "1")), json!([{"id": 10, "var_title": "A4"}]), 1).await;

        let err = resolver_for(&server).generations("Audi", "Q7").await.unwrap_err();

        assert_eq!(err.to_string(), "Model \"Q7\" not found for brand \"Audi\"");
    }

    #[tokio::test]
    async fn test_generation_match_is_exact() {
        let server = MockServer::start().await;
        mount(&server, "brands", None, json!([{"id": 1, "name": "Audi"}]), 1).await;
        mount(&server, "models", None, json!([{"id": 10, "name": "A4"}]), 1).await;
        mount(&server, "years", None, json!([{"id": 100, "name": "B9 (2015-2023)"}]), 1).await;
        mount(&server, "stages", None, json!([]), 0).await;

        let err = resolver_for(&server)
            .resolve("Audi", "A4", "b9 (2015-2023)", "2.0 TDI")
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Year \"b9 (2015-2023)\" not found for Audi A4");
    }

    #[tokio::test]
    async fn test_list_operations() {
        let server = MockServer::start().await;
        mount_audi_path(&server, 1).await;

        let resolver = resolver_for(&server);

        assert_eq!(resolver.brands().await.unwrap(), vec!["Audi", "BMW"]);
        assert_eq!(resolver.models("Audi").await.unwrap(), vec!["A4"]);
        assert_eq!(resolver.generations("Audi", "A4").await.unwrap(), vec!["B9 (2015-2023)"]);
        assert_eq!(
            resolver.engines("Audi", "A4", "B9 (2015-2023)").await.unwrap(),
            vec!["2.0 TDI", "3.0 TDI"]
        );
    }
}
