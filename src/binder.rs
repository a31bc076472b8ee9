//! Binding task parameters against a dependency snapshot.

use crate::error::LookupError;
use crate::result::{Field, PipelineResult};
use crate::task::{Argument, ParameterSpec, TaskArgs, TaskDefinition};

#[derive(Debug)]
pub(crate) enum BindError {
    /// A field reference that doesn't resolve. This is a configuration
    /// problem and aborts the run.
    Lookup { param: String, source: LookupError },
    /// A selector returned an error, which fails only this task.
    Selector { param: String, source: anyhow::Error },
}

/// Builds the argument map for one execution attempt of a task.
///
/// `inputs` holds only the results of the task's direct dependencies. It is
/// never modified.
pub(crate) fn bind(
    definition: &TaskDefinition,
    inputs: &PipelineResult,
) -> Result<TaskArgs, BindError> {
    tracing::debug!("binding arguments for {}", definition.name);
    let mut args = TaskArgs::new();

    for (param, spec) in &definition.parameters {
        let argument = match spec {
            ParameterSpec::WholeResultSet => Argument::Results(inputs.clone()),
            ParameterSpec::Field(reference) => match inputs.lookup(reference) {
                Ok(Field::Value(value)) => Argument::Value(value.clone()),
                Ok(Field::Artifact(artifact)) => Argument::Artifact(artifact.clone()),
                Err(source) => {
                    return Err(BindError::Lookup {
                        param: param.clone(),
                        source,
                    });
                }
            },
            ParameterSpec::Selector(selector) => match selector(inputs) {
                Ok(json) => Argument::Selected(json),
                Err(source) => {
                    return Err(BindError::Selector {
                        param: param.clone(),
                        source,
                    });
                }
            },
        };

        args.insert(param.clone(), argument);
    }

    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::Artifact;
    use crate::result::TaskResult;
    use crate::task::FieldReference;
    use crate::value::Value;

    fn snapshot() -> PipelineResult {
        let mut inputs = PipelineResult::new();
        inputs.task_results.insert(
            "foo".into(),
            TaskResult::new()
                .with_value("x", Value::list([1, 2, 3]))
                .with_artifact("file", Artifact::new("foo.dat")),
        );
        inputs
            .task_results
            .insert("bar".into(), TaskResult::new().with_value("y", vec![4, 5, 6]));
        inputs
    }

    fn definition(parameters: Vec<(&str, ParameterSpec)>) -> TaskDefinition {
        let mut def = TaskDefinition::new("baz");
        def.depends_on = vec!["foo".into(), "bar".into()];
        def.parameters = parameters
            .into_iter()
            .map(|(name, spec)| (name.to_string(), spec))
            .collect();
        def
    }

    #[test]
    fn test_bind_each_kind() {
        let inputs = snapshot();
        let def = definition(vec![
            ("previous_results", ParameterSpec::WholeResultSet),
            ("x", ParameterSpec::Field(FieldReference::value("foo", "x"))),
            (
                "file",
                ParameterSpec::Field(FieldReference::artifact("foo", "file")),
            ),
            (
                "total",
                ParameterSpec::selector(|res| {
                    let x: Vec<i64> = res.value("foo", "x")?.get()?;
                    let y: Vec<i64> = res.value("bar", "y")?.get()?;
                    Ok((x.iter().sum::<i64>() + y.iter().sum::<i64>()).into())
                }),
            ),
        ]);

        let args = bind(&def, &inputs).unwrap();

        assert_eq!(args.len(), 4);
        assert_eq!(args.results("previous_results").unwrap(), &inputs);
        assert_eq!(args.value::<Vec<i64>>("x").unwrap(), vec![1, 2, 3]);
        assert_eq!(args.artifact("file").unwrap().location, "foo.dat");
        assert_eq!(args.selected::<i64>("total").unwrap(), 21);
    }

    #[test]
    fn test_missing_field_fails_loudly() {
        let def = definition(vec![(
            "z",
            ParameterSpec::Field(FieldReference::value("foo", "z")),
        )]);

        match bind(&def, &snapshot()) {
            Err(BindError::Lookup { param, source }) => {
                assert_eq!(param, "z");
                assert_eq!(
                    source,
                    LookupError::MissingValue {
                        task: "foo".into(),
                        field: "z".into()
                    }
                );
            }
            other => panic!("expected a lookup error, got {other:?}"),
        }
    }

    #[test]
    fn test_selector_error() {
        let def = definition(vec![(
            "x",
            ParameterSpec::selector(|_| Err(anyhow::anyhow!("no luck"))),
        )]);

        assert!(matches!(
            bind(&def, &snapshot()),
            Err(BindError::Selector { .. })
        ));
    }
}
