use std::fmt::{Debug, Display};

use acmorph_core::{AcmorphError, AcmorphResult, Category, Channel, Event};
use dyn_clone::DynClone;
use serde::{Deserialize, Serialize};

/// A per-event predicate deciding which events enter a template.
///
/// Selections are serializable: the JSON of the selection a basis was filled with is part of
/// its [`BasisFingerprint`](crate::basis::BasisFingerprint), which is stored in the basis and
/// decides which artifact and cache entry it belongs to. A selection which needs a field the event does not have must fail rather than reject
/// the event.
#[typetag::serde(tag = "type")]
pub trait Selection: DynClone + Debug + Display + Send + Sync {
    /// Whether `event` passes.
    fn accepts(&self, event: &Event<'_>) -> AcmorphResult<bool>;
}

dyn_clone::clone_trait_object!(Selection);

/// Accepts every event.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct All;

impl Display for All {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "all")
    }
}

#[typetag::serde]
impl Selection for All {
    fn accepts(&self, _event: &Event<'_>) -> AcmorphResult<bool> {
        Ok(true)
    }
}

/// Accepts events passing every one of its selections. Evaluation stops at the first rejection.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct And(pub Vec<Box<dyn Selection>>);

impl And {
    /// Combine two selections.
    pub fn new(a: Box<dyn Selection>, b: Box<dyn Selection>) -> Self {
        Self(vec![a, b])
    }
}

impl Display for And {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|s| s.to_string()).collect();
        write!(f, "({})", parts.join(" && "))
    }
}

#[typetag::serde]
impl Selection for And {
    fn accepts(&self, event: &Event<'_>) -> AcmorphResult<bool> {
        for selection in &self.0 {
            if !selection.accepts(event)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Four-lepton mass window, lower edge inclusive and upper edge exclusive.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MassWindow {
    /// The mass field
    pub field: String,
    /// Lower edge in GeV
    pub low: f64,
    /// Upper edge in GeV
    pub high: f64,
}

impl MassWindow {
    /// A window on `ZZMass`.
    pub fn new(low: f64, high: f64) -> Self {
        Self {
            field: "ZZMass".to_string(),
            low,
            high,
        }
    }
}

impl Display for MassWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <= {} < {}", self.low, self.field, self.high)
    }
}

#[typetag::serde]
impl Selection for MassWindow {
    fn accepts(&self, event: &Event<'_>) -> AcmorphResult<bool> {
        let mass = event.require_scalar(&self.field)?;
        Ok(self.low <= mass && mass < self.high)
    }
}

/// Selects one lepton-flavor channel from the product of the two Z candidates' flavors.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlavorSelection {
    /// The channel to keep
    pub channel: Channel,
}

impl FlavorSelection {
    /// Keep the events of `channel`.
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }
}

impl Display for FlavorSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "channel == {}", self.channel)
    }
}

#[typetag::serde]
impl Selection for FlavorSelection {
    fn accepts(&self, event: &Event<'_>) -> AcmorphResult<bool> {
        let zz_flav = event.require_scalar("Z1Flav")? * event.require_scalar("Z2Flav")?;
        if zz_flav.fract() != 0.0 {
            return Err(AcmorphError::Custom(format!(
                "event {} has a non-integer flavor product {}",
                event.index(),
                zz_flav
            )));
        }
        // other flavor products (same-sign control regions) belong to no channel
        Ok(Channel::from_zz_flav(zz_flav as i64).is_ok_and(|channel| channel == self.channel))
    }
}

/// Selects one category from a label stored on the event by a categorization pass.
///
/// The label field is the name of the categorization which produced it, so the same category can
/// be selected under different hypotheses and systematic variants.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CategorySelection {
    /// The field holding the category id
    pub field: String,
    /// The category to keep
    pub category: Category,
}

impl CategorySelection {
    /// Keep the events whose label in `field` is `category`.
    pub fn new<S: Into<String>>(field: S, category: Category) -> Self {
        Self {
            field: field.into(),
            category,
        }
    }
}

impl Display for CategorySelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} == {}", self.field, self.category)
    }
}

#[typetag::serde]
impl Selection for CategorySelection {
    fn accepts(&self, event: &Event<'_>) -> AcmorphResult<bool> {
        let id = event.require_scalar(&self.field)?;
        Ok(Category::from_id(id as i32)? == self.category)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use acmorph_core::{Dataset, EventData, EventSchema};

    use super::*;

    fn dataset() -> Dataset {
        let schema = EventSchema::new(
            vec!["ZZMass", "Z1Flav", "Z2Flav", "category_0P"],
            Vec::<String>::new(),
        )
        .unwrap();
        Dataset::new(
            Arc::new(schema),
            vec![
                EventData::new(vec![125.0, -121.0, -121.0, 0.0], vec![]),
                EventData::new(vec![125.0, -121.0, -169.0, 2.0], vec![]),
                EventData::new(vec![150.0, -169.0, -169.0, 0.0], vec![]),
                EventData::new(vec![105.0, -169.0, 169.0, 4.0], vec![]),
            ],
        )
        .unwrap()
    }

    fn accepted(selection: &dyn Selection) -> Vec<usize> {
        dataset()
            .iter()
            .filter(|event| selection.accepts(event).unwrap())
            .map(|event| event.index())
            .collect()
    }

    #[test]
    fn test_mass_window() {
        assert_eq!(accepted(&MassWindow::new(105.0, 140.0)), vec![0, 1, 3]);
        assert_eq!(accepted(&MassWindow::new(105.5, 140.0)), vec![0, 1]);
    }

    #[test]
    fn test_flavor() {
        assert_eq!(accepted(&FlavorSelection::new(Channel::FourE)), vec![0]);
        assert_eq!(accepted(&FlavorSelection::new(Channel::TwoETwoMu)), vec![1]);
        assert_eq!(accepted(&FlavorSelection::new(Channel::FourMu)), vec![2, 3]);
    }

    #[test]
    fn test_category_and_combination() {
        let selection = And::new(
            Box::new(MassWindow::new(105.0, 140.0)),
            Box::new(CategorySelection::new("category_0P", Category::Untagged)),
        );
        assert_eq!(accepted(&selection), vec![0]);
        assert_eq!(accepted(&All), vec![0, 1, 2, 3]);
        assert_eq!(
            selection.to_string(),
            "(105 <= ZZMass < 140 && category_0P == Untagged)"
        );
    }

    #[test]
    fn test_missing_field_fails() {
        let dataset = dataset();
        let event = dataset.event(0).unwrap();
        let selection = CategorySelection::new("category_0M", Category::Untagged);
        assert!(matches!(
            selection.accepts(&event),
            Err(AcmorphError::MissingFieldError { .. })
        ));
    }

    #[test]
    fn test_boxed_selection_clones() {
        let selection: Box<dyn Selection> = Box::new(And(vec![
            Box::new(MassWindow::new(105.0, 140.0)),
            Box::new(FlavorSelection::new(Channel::FourMu)),
        ]));
        let cloned = selection.clone();
        assert_eq!(selection.to_string(), cloned.to_string());
    }
}
