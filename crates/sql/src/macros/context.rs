use tripwire_core::{DatasetMetadata, DetectionInterval, Properties, PropertyKey};

use crate::dialect::RenderSettings;
use crate::expression::SqlExpressionBuilder;

/// State shared by every macro call of one `prepare_request`.
pub struct MacroExpansionContext<'a> {
    pub expression_builder: &'a dyn SqlExpressionBuilder,
    pub interval: DetectionInterval,
    pub dataset: Option<&'a DatasetMetadata>,
    render: &'a RenderSettings,
    properties: Properties,
}

impl<'a> MacroExpansionContext<'a> {
    pub fn new(
        expression_builder: &'a dyn SqlExpressionBuilder,
        interval: DetectionInterval,
        render: &'a RenderSettings,
    ) -> Self {
        Self {
            expression_builder,
            interval,
            dataset: None,
            render,
            properties: Properties::new(),
        }
    }

    pub fn unquote_literal(&self, text: &str) -> String {
        self.render.unquote_literal(text)
    }

    pub fn quote_identifier(&self, name: &str) -> String {
        self.render.quote_identifier(name)
    }

    /// Timezone to bucket in, from the dataset metadata.
    pub fn timezone(&self) -> Option<&str> {
        self.dataset.and_then(|d| d.timezone.as_deref())
    }

    /// Storage format the dataset declares for `column`. A dataset without a
    /// time column name applies its format to any column.
    pub fn time_format_of(&self, column: &str) -> Option<&str> {
        let dataset = self.dataset?;
        let format = dataset.time_format.as_deref()?;
        match dataset.time_column.as_deref() {
            Some(time_column) if time_column != column => None,
            _ => Some(format),
        }
    }

    pub fn set_property(&mut self, key: PropertyKey, value: impl Into<String>) {
        self.properties.insert(key.to_string(), value.into());
    }

    pub fn property(&self, key: PropertyKey) -> Option<&str> {
        self.properties.get(key.as_str()).map(String::as_str)
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub(crate) fn into_properties(self) -> Properties {
        self.properties
    }
}
