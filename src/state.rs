use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::classifier::Classifier;
use crate::labels::{LabelTable, FOOD_LABELS, FRUIT_LABELS};
use crate::preprocessing::Normalization;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain
{
    Food,
    Fruit,
}

impl Domain
{
    pub fn name(&self) -> &'static str
    {
        match self
        {
            Domain::Food => "food",
            Domain::Fruit => "fruit",
        }
    }

    pub fn route(&self) -> &'static str
    {
        match self
        {
            Domain::Food => "/predict/food",
            Domain::Fruit => "/predict/fruit",
        }
    }

    pub fn labels(&self) -> LabelTable
    {
        match self
        {
            Domain::Food => FOOD_LABELS,
            Domain::Fruit => FRUIT_LABELS,
        }
    }
}

/// One loaded classifier with the label table that decodes its outputs.
/// Built once during startup and never mutated afterwards.
#[derive(Clone)]
pub struct ClassifierState
{
    pub domain: Domain,
    pub classifier: Arc<dyn Classifier>,
    pub model_path: PathBuf,
}

impl ClassifierState
{
    pub fn new(domain: Domain, classifier: Arc<dyn Classifier>, model_path: &Path) -> Self
    {
        ClassifierState { domain, classifier, model_path: model_path.to_path_buf() }
    }

    pub fn labels(&self) -> LabelTable
    {
        self.domain.labels()
    }
}

/// Shared, read-only state handed to every request handler.
#[derive(Clone)]
pub struct AppState
{
    pub food: ClassifierState,
    pub fruit: ClassifierState,
    pub normalization: Normalization,
}

impl AppState
{
    pub fn classifier(&self, domain: Domain) -> &ClassifierState
    {
        match domain
        {
            Domain::Food => &self.food,
            Domain::Fruit => &self.fruit,
        }
    }
}
