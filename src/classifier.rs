use std::path::{Path, PathBuf};

use log::{debug, info};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, ValueType};

use crate::error::{InferenceError, LoadError};
use crate::labels::LabelTable;
use crate::preprocessing::ImageTensor;

pub const DEFAULT_INTRA_THREADS: usize = 4;

/// Anything that maps a preprocessed image to one score per class.
/// Implementations must be pure with respect to the input and safe to call
/// from any number of threads at once; the server shares one instance per
/// domain across every request without locking.
pub trait Classifier: Send + Sync
{
    fn infer(&self, tensor: ImageTensor) -> Result<Vec<f32>, InferenceError>;
}

/// A softmax image classifier executed with ONNX Runtime.
///
/// The Keras MobileNetV3 models are exported to ONNX (e.g. with tf2onnx) keeping their
/// NHWC input layout, so the session is fed the (1, 224, 224, 3) tensor from
/// preprocessing as-is. The session is created once at startup and kept for the
/// whole process.
pub struct OnnxClassifier
{
    session: Session,
    path: PathBuf,
    input_name: String,
    output_name: String,
    /// Declared input dimensions; negative entries are dynamic.
    input_dimensions: Vec<i64>,
}

impl OnnxClassifier
{
    /// Loads the model at `path` and checks it against `labels`.
    /// Fails if the file is missing, is not a usable ONNX graph, or declares
    /// a class dimension that differs from the label table length.
    pub fn load(path: &Path, labels: LabelTable, intra_threads: usize) -> Result<Self, LoadError>
    {
        if !path.exists() {
            return Err(LoadError::NotFound(path.to_path_buf()));
        }

        let session = Session::builder()
            .and_then(|builder| builder.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|builder| builder.with_intra_threads(intra_threads))
            .and_then(|builder| builder.commit_from_file(path))
            .map_err(|source| LoadError::Ort { path: path.to_path_buf(), source })?;

        let input = session.inputs.first().ok_or_else(|| LoadError::NoInput(path.to_path_buf()))?;
        let input_dimensions = match &input.input_type {
            ValueType::Tensor { dimensions, .. } => dimensions.clone(),
            _ => return Err(LoadError::NoInput(path.to_path_buf())),
        };
        let input_name = input.name.clone();

        let output = session.outputs.first().ok_or_else(|| LoadError::NoOutput(path.to_path_buf()))?;
        if let ValueType::Tensor { dimensions, .. } = &output.output_type {
            check_output_classes(path, dimensions, labels)?;
        }
        let output_name = output.name.clone();

        info!("Loaded {:?}: input {:?} {:?}, output {:?}", path, input_name, input_dimensions, output_name);

        Ok(OnnxClassifier {
            session,
            path: path.to_path_buf(),
            input_name,
            output_name,
            input_dimensions,
        })
    }

    pub fn path(&self) -> &Path
    {
        &self.path
    }
}

impl Classifier for OnnxClassifier
{
    fn infer(&self, tensor: ImageTensor) -> Result<Vec<f32>, InferenceError>
    {
        check_input_shape(&self.input_dimensions, tensor.shape())?;

        let input = Tensor::from_array(tensor.into_array())?;
        let outputs = self.session.run(ort::inputs![self.input_name.as_str() => input]?)?;

        let output = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| InferenceError::MissingOutput(self.output_name.clone()))?;

        // Shape is (1, num_classes); flattening the single batch row gives the score vector.
        let scores: Vec<f32> = output.try_extract_tensor::<f32>()?.iter().copied().collect();
        debug!("{:?} produced {} scores", self.path, scores.len());

        Ok(scores)
    }
}

/// Compares a tensor shape with the model's declared input dimensions.
/// Negative declared dimensions are dynamic and match any size.
pub fn check_input_shape(expected: &[i64], actual: &[usize]) -> Result<(), InferenceError>
{
    let matches = expected.len() == actual.len()
        && expected.iter().zip(actual).all(|(e, a)| *e < 0 || *e as usize == *a);

    if matches {
        Ok(())
    } else {
        Err(InferenceError::InputShapeMismatch { expected: expected.to_vec(), actual: actual.to_vec() })
    }
}

fn check_output_classes(path: &Path, dimensions: &[i64], labels: LabelTable) -> Result<(), LoadError>
{
    match dimensions.last() {
        Some(&classes) if classes >= 0 && classes as usize != labels.len() => Err(LoadError::LabelMismatch {
            path: path.to_path_buf(),
            outputs: classes,
            labels: labels.len(),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
pub(crate) mod stubs
{
    use super::*;

    /// Returns the same scores for every input.
    pub(crate) struct FixedScores(pub Vec<f32>);

    impl Classifier for FixedScores
    {
        fn infer(&self, _tensor: ImageTensor) -> Result<Vec<f32>, InferenceError>
        {
            Ok(self.0.clone())
        }
    }

    /// Deterministic stand-in for a real model: the mean pixel value picks the
    /// winning class, which gets 0.9 of the probability mass.
    pub(crate) struct BrightnessClassifier
    {
        pub classes: usize,
    }

    impl Classifier for BrightnessClassifier
    {
        fn infer(&self, tensor: ImageTensor) -> Result<Vec<f32>, InferenceError>
        {
            let mean = tensor.view().mean().unwrap_or(0.0);
            let winner = (mean.max(0.0) as usize) % self.classes;
            let rest = 0.1 / (self.classes - 1) as f32;
            Ok((0..self.classes).map(|i| if i == winner { 0.9 } else { rest }).collect())
        }
    }

    pub(crate) struct FailingClassifier;

    impl Classifier for FailingClassifier
    {
        fn infer(&self, tensor: ImageTensor) -> Result<Vec<f32>, InferenceError>
        {
            Err(InferenceError::InputShapeMismatch { expected: vec![1, 299, 299, 3], actual: tensor.shape().to_vec() })
        }
    }
}

#[cfg(test)]
mod tests
{
    use std::io::Write;

    use crate::labels::{FOOD_LABELS, FRUIT_LABELS};
    use super::*;

    #[test]
    fn test_input_shape_exact_match()
    {
        assert!(check_input_shape(&[1, 224, 224, 3], &[1, 224, 224, 3]).is_ok());
    }

    #[test]
    fn test_input_shape_dynamic_batch()
    {
        assert!(check_input_shape(&[-1, 224, 224, 3], &[1, 224, 224, 3]).is_ok());
    }

    #[test]
    fn test_input_shape_mismatch()
    {
        // NCHW model fed an NHWC tensor.
        let result = check_input_shape(&[1, 3, 224, 224], &[1, 224, 224, 3]);
        assert!(matches!(result, Err(InferenceError::InputShapeMismatch { .. })));

        let result = check_input_shape(&[1, 224, 224], &[1, 224, 224, 3]);
        assert!(result.is_err());
    }

    #[test]
    fn test_output_classes_checked_against_labels()
    {
        let path = Path::new("food.onnx");
        assert!(check_output_classes(path, &[-1, 130], FOOD_LABELS).is_ok());
        assert!(check_output_classes(path, &[1, -1], FOOD_LABELS).is_ok());

        let result = check_output_classes(path, &[-1, 130], FRUIT_LABELS);
        assert!(matches!(result, Err(LoadError::LabelMismatch { outputs: 130, labels: 32, .. })));
    }

    #[test]
    fn test_load_missing_model()
    {
        let result = OnnxClassifier::load(Path::new("/nonexistent/model.onnx"), FOOD_LABELS, 1);
        assert!(matches!(result, Err(LoadError::NotFound(_))));
    }

    #[test]
    fn test_load_corrupt_model()
    {
        let path = std::env::temp_dir().join(format!("{}.onnx", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"not a protobuf graph").unwrap();
        drop(file);

        let result = OnnxClassifier::load(&path, FRUIT_LABELS, 1);
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(result, Err(LoadError::Ort { .. })));
    }
}
