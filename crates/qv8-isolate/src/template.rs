//! Object and function templates
//!
//! A template is a list of named property values stamped onto every
//! object made from it. The isolate registers each template it hands out
//! and releases their values, newest first, when it is disposed.

use qv8_core::{HandleKind, JsHandle, new_string};
use rquickjs::{Object, Value};
use std::cell::RefCell;
use std::rc::Rc;

use crate::error::IsolateResult;
use crate::isolate::Isolate;
use crate::local::Local;
use crate::value::as_object;

/// Properties copied onto new instances
#[derive(Debug, Default)]
pub struct ObjectTemplate {
    properties: RefCell<Vec<(String, JsHandle)>>,
}

impl ObjectTemplate {
    pub fn property_count(&self) -> usize {
        self.properties.borrow().len()
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.properties.borrow().iter().any(|(key, _)| key == name)
    }

    fn set(&self, name: &str, value: JsHandle) {
        let mut properties = self.properties.borrow_mut();
        match properties.iter_mut().find(|(key, _)| key == name) {
            Some(entry) => entry.1 = value,
            None => properties.push((name.to_string(), value)),
        }
    }

    fn apply<'js>(&self, ctx: &rquickjs::Ctx<'js>, target: &Object<'js>) -> IsolateResult<()> {
        for (name, value) in self.properties.borrow().iter() {
            target.set(name.as_str(), value.restore(ctx)?)?;
        }
        Ok(())
    }

    /// Release every stored value; returns how many there were
    pub(crate) fn dispose(&self) -> usize {
        let released = std::mem::take(&mut *self.properties.borrow_mut());
        released.len()
    }
}

/// A named constructor plus a template for its prototype
#[derive(Debug, Default)]
pub struct FunctionTemplate {
    class_name: Option<String>,
    prototype: ObjectTemplate,
}

impl FunctionTemplate {
    pub fn class_name(&self) -> Option<&str> {
        self.class_name.as_deref()
    }

    pub fn prototype_template(&self) -> &ObjectTemplate {
        &self.prototype
    }

    pub(crate) fn dispose(&self) -> usize {
        self.prototype.dispose()
    }
}

/// Any template the isolate keeps track of
#[derive(Debug, Clone)]
pub enum Template {
    Function(Rc<FunctionTemplate>),
    Object(Rc<ObjectTemplate>),
}

impl Template {
    fn same(&self, other: &Template) -> bool {
        match (self, other) {
            (Template::Function(a), Template::Function(b)) => Rc::ptr_eq(a, b),
            (Template::Object(a), Template::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub(crate) fn dispose(&self) -> usize {
        match self {
            Template::Function(template) => template.dispose(),
            Template::Object(template) => template.dispose(),
        }
    }
}

/// Templates in registration order
#[derive(Debug, Default)]
pub(crate) struct TemplateRegistry {
    templates: Vec<Template>,
}

impl TemplateRegistry {
    /// Register `template`; false if it is already registered
    pub fn add(&mut self, template: Template) -> bool {
        if self.templates.iter().any(|known| known.same(&template)) {
            return false;
        }
        self.templates.push(template);
        true
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Release all templates, last registered first
    pub fn dispose_all(&mut self) -> usize {
        let count = self.templates.len();
        while let Some(template) = self.templates.pop() {
            template.dispose();
        }
        count
    }
}

impl Isolate {
    pub fn new_object_template(&mut self) -> Rc<ObjectTemplate> {
        let template = Rc::new(ObjectTemplate::default());
        self.templates.add(Template::Object(template.clone()));
        template
    }

    pub fn new_function_template(&mut self, class_name: Option<&str>) -> Rc<FunctionTemplate> {
        let template = Rc::new(FunctionTemplate {
            class_name: class_name.map(str::to_string),
            prototype: ObjectTemplate::default(),
        });
        self.templates.add(Template::Function(template.clone()));
        template
    }

    /// Register a template for release at dispose; false if already known
    pub fn add_template(&mut self, template: Template) -> bool {
        self.templates.add(template)
    }

    pub fn template_count(&self) -> usize {
        self.templates.len()
    }

    /// Store `value` under `name` on `template`
    pub fn set_template_property(
        &mut self,
        template: &ObjectTemplate,
        name: &str,
        value: Local,
    ) -> IsolateResult<()> {
        let handle = self.handle(value)?.acquire(HandleKind::PersistentValue);
        template.set(name, handle);
        Ok(())
    }

    /// A new plain object carrying the template's properties
    pub fn new_instance(&mut self, template: &ObjectTemplate) -> IsolateResult<Local> {
        self.engine_local(|ctx, _| {
            let object = Object::new(ctx.clone())?;
            template.apply(ctx, &object)?;
            Ok(object.into_value())
        })
    }

    /// The constructor described by `template`
    pub fn get_function(&mut self, template: &FunctionTemplate) -> IsolateResult<Local> {
        self.engine_local(|ctx, isolate| {
            let name = new_string(ctx, template.class_name().unwrap_or(""))?;
            let undefined = Value::new_undefined(ctx.clone());
            let constructor = isolate.polyfills()?.make_class.call(ctx, undefined, vec![name])?;
            let prototype = as_object(as_object(constructor.clone())?.get("prototype")?)?;
            template.prototype.apply(ctx, &prototype)?;
            Ok(constructor)
        })
    }

    /// Template for objects the isolate creates for its own bookkeeping
    pub fn hidden_object_template(&mut self) -> Rc<ObjectTemplate> {
        self.hidden_template
            .get_or_insert_with(|| Rc::new(ObjectTemplate::default()))
            .clone()
    }
}
