use super::form::FormValue;
use super::registry::{DisplayLink, LoadContext, PostBackHandler};
use crate::core::Result;
use crate::modification::{
    BasicValidationList, DataModification, ModificationContext, ValidationList, Validator,
};
use crate::page::form::PostBackValues;
use std::rc::Rc;

pub const ERROR_DISPLAY_SUFFIX: &str = "_error";

/// A node of the page's control tree
pub trait Control {
    fn id(&self) -> &str;

    /// Register this control's contributions
    ///
    /// Children load after their parent, in order.
    fn load_data(&mut self, ctx: &mut LoadContext<'_>) -> Result<()>;

    fn children_mut(&mut self) -> &mut [Box<dyn Control>] {
        &mut []
    }
}

/// Load a control and all of its descendants, parents first
pub fn load_tree(control: &mut dyn Control, ctx: &mut LoadContext<'_>) -> Result<()> {
    control.load_data(ctx)?;
    for child in control.children_mut() {
        load_tree(child.as_mut(), ctx)?;
    }
    Ok(())
}

/// Groups controls without contributing anything itself
pub struct Container {
    id: String,
    children: Vec<Box<dyn Control>>,
}

impl Container {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            children: Vec::new(),
        }
    }

    pub fn child(mut self, control: impl Control + 'static) -> Self {
        self.children.push(Box::new(control));
        self
    }
}

impl Control for Container {
    fn id(&self) -> &str {
        &self.id
    }

    fn load_data(&mut self, _ctx: &mut LoadContext<'_>) -> Result<()> {
        Ok(())
    }

    fn children_mut(&mut self) -> &mut [Box<dyn Control>] {
        &mut self.children
    }
}

type SaveFn = Rc<dyn Fn(&mut ModificationContext<'_>, &str) -> Result<()>>;

/// Single-line text input
///
/// Validates into the page's post-back modification and, if given a save
/// callback, writes the trimmed value back when the post-back succeeds.
pub struct TextField {
    id: String,
    label: String,
    durable_value: String,
    required: bool,
    max_length: usize,
    on_save: Option<SaveFn>,
}

impl TextField {
    pub fn new(id: &str, label: &str, durable_value: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            durable_value: durable_value.to_string(),
            required: false,
            max_length: 200,
            on_save: None,
        }
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn on_save<F>(mut self, save: F) -> Self
    where
        F: Fn(&mut ModificationContext<'_>, &str) -> Result<()> + 'static,
    {
        self.on_save = Some(Rc::new(save));
        self
    }
}

impl Control for TextField {
    fn id(&self) -> &str {
        &self.id
    }

    fn load_data(&mut self, ctx: &mut LoadContext<'_>) -> Result<()> {
        let value = ctx.add_form_value(FormValue::new(self.id.clone(), self.durable_value.clone()));
        ctx.add_focusable(&self.id);

        let (label, required, max_length) = (self.label.clone(), self.required, self.max_length);
        let checked = value.clone();
        let validation = ctx.post_back_modification().add_validation(move |values, v| {
            v.get_string(checked.value(values), &label, !required, max_length);
        });
        ctx.add_modification_error_display(&self.id, ERROR_DISPLAY_SUFFIX, validation);

        if let Some(save) = self.on_save.clone() {
            ctx.post_back_modification().add_modification(move |m| {
                let text = m.value(&value).trim().to_string();
                save(m, &text)
            });
        }
        Ok(())
    }
}

/// Boolean input posting "true" or "false"
///
/// Anything else in the posted field is treated as tampering.
pub struct Checkbox {
    id: String,
    checked: bool,
    shows: Vec<String>,
    on_save: Option<Rc<dyn Fn(&mut ModificationContext<'_>, bool) -> Result<()>>>,
}

impl Checkbox {
    pub fn new(id: &str, checked: bool) -> Self {
        Self {
            id: id.to_string(),
            checked,
            shows: Vec::new(),
            on_save: None,
        }
    }

    pub fn on_save<F>(mut self, save: F) -> Self
    where
        F: Fn(&mut ModificationContext<'_>, bool) -> Result<()> + 'static,
    {
        self.on_save = Some(Rc::new(save));
        self
    }

    /// Show these controls only while checked
    pub fn shows(mut self, control_ids: &[&str]) -> Self {
        self.shows = control_ids.iter().map(|id| id.to_string()).collect();
        self
    }

    pub fn is_checked(form_value: &FormValue, values: &PostBackValues) -> bool {
        form_value.value(values) == "true"
    }
}

impl Control for Checkbox {
    fn id(&self) -> &str {
        &self.id
    }

    fn load_data(&mut self, ctx: &mut LoadContext<'_>) -> Result<()> {
        let value = ctx.add_form_value(
            FormValue::new(self.id.clone(), self.checked.to_string())
                .with_validity_check(|posted| posted == "true" || posted == "false"),
        );
        ctx.add_focusable(&self.id);
        if let Some(save) = self.on_save.clone() {
            ctx.post_back_modification().add_modification(move |m| {
                let checked = Checkbox::is_checked(&value, m.values);
                save(m, checked)
            });
        }
        if !self.shows.is_empty() {
            ctx.add_display_link(DisplayLink {
                form_value_key: self.id.clone(),
                shown_when: "true".into(),
                control_ids: self.shows.clone(),
            });
        }
        Ok(())
    }
}

type ActionFn = Rc<dyn Fn(&mut ModificationContext<'_>) -> Result<()>>;

/// Button that raises an event post-back
pub struct PostBackButton {
    id: String,
    uses_submit_behavior: bool,
    validations: BasicValidationList,
    action: Option<ActionFn>,
}

impl PostBackButton {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            uses_submit_behavior: false,
            validations: BasicValidationList::new(),
            action: None,
        }
    }

    /// Make this the button that the enter key presses
    pub fn submit(mut self) -> Self {
        self.uses_submit_behavior = true;
        self
    }

    pub fn validation<F>(mut self, validation: F) -> Self
    where
        F: Fn(&PostBackValues, &mut Validator) + 'static,
    {
        self.validations.add_validation(validation);
        self
    }

    pub fn action<F>(mut self, action: F) -> Self
    where
        F: Fn(&mut ModificationContext<'_>) -> Result<()> + 'static,
    {
        self.action = Some(Rc::new(action));
        self
    }
}

impl Control for PostBackButton {
    fn id(&self) -> &str {
        &self.id
    }

    fn load_data(&mut self, ctx: &mut LoadContext<'_>) -> Result<()> {
        let mut modification = DataModification::new();
        modification.add_validations(&self.validations);
        if let Some(action) = self.action.clone() {
            modification.add_modification(move |m| action(m));
        }
        ctx.add_post_back_handler(PostBackHandler {
            type_name: "PostBackButton",
            unique_id: self.id.clone(),
            uses_submit_behavior: self.uses_submit_behavior,
            modification,
        });
        Ok(())
    }
}
