use std::sync::Arc;

use acmorph_categorization::CategorizationSpec;
use acmorph_core::{AcmorphError, AcmorphResult, Dataset, EventData, EventSchema, EventSource};

/// Copy `source` into memory with one more scalar field, `field`, holding the id of the category
/// `spec` assigns to each event.
///
/// The result can be filtered with [`CategorySelection`](acmorph_templates::CategorySelection)
/// when filling templates.
pub fn with_category_field(
    source: &dyn EventSource,
    spec: &CategorizationSpec,
    field: &str,
) -> AcmorphResult<Dataset> {
    let labels = spec.categorize_all(source)?;
    let schema = source.schema();
    let scalar_names: Vec<String> = schema
        .scalar_names()
        .map(str::to_string)
        .chain(std::iter::once(field.to_string()))
        .collect();
    let array_names: Vec<String> = schema.array_names().map(str::to_string).collect();
    let extended = Arc::new(EventSchema::new(scalar_names, array_names)?);
    let mut events = Vec::with_capacity(labels.len());
    source.for_each_event(&mut |event| {
        let label = labels.get(events.len()).ok_or_else(|| {
            AcmorphError::Custom(format!(
                "{} yielded more events on the second pass",
                spec.name()
            ))
        })?;
        let mut scalars = schema
            .scalar_names()
            .map(|name| event.require_scalar(name))
            .collect::<AcmorphResult<Vec<f64>>>()?;
        scalars.push(label.id() as f64);
        let arrays = schema
            .array_names()
            .map(|name| event.require_array(name).map(<[f64]>::to_vec))
            .collect::<AcmorphResult<Vec<Vec<f64>>>>()?;
        events.push(EventData::new(scalars, arrays));
        Ok(())
    })?;
    Dataset::new(extended, events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use acmorph_categorization::{CategorizationFactory, CategoryInputs, InputVariables};
    use acmorph_core::{
        AnalysisConfig, Category, Event, Hypothesis, ProductionMode, SystematicVariant,
    };
    use acmorph_templates::{CategorySelection, Selection};

    #[test]
    fn test_labels_are_attached() {
        let variables = InputVariables::for_systematic(SystematicVariant::Nominal);
        let schema = Arc::new(
            EventSchema::new(
                vec![
                    variables.n_extra_leptons,
                    variables.n_extra_z,
                    variables.n_jets,
                    variables.n_btagged_jets,
                    variables.zz_mass,
                    variables.zz_pt,
                    variables.pfmet,
                    variables.p_hj,
                    variables.p_vbf_1j,
                    variables.p_aux,
                ],
                vec![variables.jet_qg_likelihoods, variables.jet_phis],
            )
            .unwrap(),
        );
        let events = (0..4)
            .map(|n_jets| {
                EventData::new(
                    vec![0.0, 0.0, n_jets as f64, 0.0, 125.0, 10.0, 5.0, 0.1, 0.1, 0.1],
                    vec![vec![0.5; n_jets], vec![0.0; n_jets]],
                )
            })
            .collect();
        let source = Dataset::new(schema, events).unwrap();
        let factory = CategorizationFactory::new(
            &AnalysisConfig::default(),
            |_: &str, _: &Event<'_>| Ok::<_, AcmorphError>(1.0),
            |inputs: &CategoryInputs<'_>| {
                if inputs.n_jets >= 2 {
                    Category::VBF2jTagged
                } else {
                    Category::Untagged
                }
            },
        );
        let spec = factory
            .single(ProductionMode::GGH, &Hypothesis::sm(), SystematicVariant::Nominal)
            .unwrap();
        let labelled = with_category_field(&source, &spec, "category").unwrap();
        assert_eq!(labelled.schema().n_scalars(), 11);
        let selection = CategorySelection::new("category", Category::VBF2jTagged);
        let accepted: Vec<bool> = labelled
            .iter()
            .map(|event| selection.accepts(&event).unwrap())
            .collect();
        assert_eq!(accepted, vec![false, false, true, true]);
        assert_eq!(labelled.event(3).unwrap().array("jetPhi").unwrap().len(), 3);
        assert!(with_category_field(&source, &spec, "ZZMass").is_err());
    }
}
