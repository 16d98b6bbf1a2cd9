use burn::{module::Param, prelude::*};

use crate::error::UNetError;

/// Parameter names paired with their dimensions, in module declaration order.
pub type ParamShapes = Vec<(String, Vec<usize>)>;

pub(crate) fn push_param<B: Backend, const D: usize>(
    shapes: &mut ParamShapes,
    name: String,
    param: &Param<Tensor<B, D>>,
) {
    shapes.push((name, param.val().dims().to_vec()));
}

/// Checks that two parameter layouts agree name by name and shape by shape.
pub fn ensure_same_shapes(expected: &ParamShapes, actual: &ParamShapes) -> Result<(), UNetError> {
    for (name, expected_dims) in expected {
        let actual_dims = actual
            .iter()
            .find(|(actual_name, _)| actual_name == name)
            .map(|(_, dims)| dims);

        match actual_dims {
            Some(dims) if dims == expected_dims => {}
            Some(dims) => {
                return Err(UNetError::ShapeMismatch {
                    context: name.clone(),
                    expected: format!("{expected_dims:?}"),
                    actual: format!("{dims:?}"),
                });
            }
            None => {
                return Err(UNetError::ShapeMismatch {
                    context: name.clone(),
                    expected: format!("{expected_dims:?}"),
                    actual: "missing".to_string(),
                });
            }
        }
    }

    if let Some((name, dims)) = actual
        .iter()
        .find(|(name, _)| !expected.iter().any(|(expected_name, _)| expected_name == name))
    {
        return Err(UNetError::ShapeMismatch {
            context: name.clone(),
            expected: "missing".to_string(),
            actual: format!("{dims:?}"),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shapes(entries: &[(&str, &[usize])]) -> ParamShapes {
        entries
            .iter()
            .map(|(name, dims)| (name.to_string(), dims.to_vec()))
            .collect()
    }

    #[test]
    fn identical_layouts_are_accepted() {
        let layout = shapes(&[("inc.conv1.weight", &[8, 1, 3, 3]), ("outc.weight", &[1, 8, 1, 1])]);
        assert!(ensure_same_shapes(&layout, &layout.clone()).is_ok());
    }

    #[test]
    fn differing_dims_are_rejected() {
        let expected = shapes(&[("inc.conv1.weight", &[8, 3, 3, 3])]);
        let actual = shapes(&[("inc.conv1.weight", &[8, 1, 3, 3])]);

        match ensure_same_shapes(&expected, &actual) {
            Err(UNetError::ShapeMismatch { context, .. }) => assert_eq!(context, "inc.conv1.weight"),
            other => panic!("Expected shape mismatch, got {other:?}"),
        }
    }

    #[test]
    fn extra_or_missing_params_are_rejected() {
        let expected = shapes(&[("outc.weight", &[1, 8, 1, 1])]);
        let actual = shapes(&[("outc.weight", &[1, 8, 1, 1]), ("outc.bias", &[1])]);

        assert!(ensure_same_shapes(&expected, &actual).is_err());
        assert!(ensure_same_shapes(&actual, &expected).is_err());
    }
}
