//! Serializable graph blueprints

use core::hash::{Hash, Hasher};
use std::collections::hash_map::DefaultHasher;

use itertools::Itertools;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::buffer::HeapAllocator;
use crate::command::EventQueue;
use crate::element::{random_id, PrepareParams};
use crate::error::GraphClassError;
use crate::factory::{create_element, find_element_desc, ElementArg, ElementDesc, PortDesc};
use crate::loader::Loader;

/// Connection from an element output port to an element input port
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Link {
    pub id: String,
    pub src_element: String,
    pub src_port: String,
    pub dst_element: String,
    pub dst_port: String,
}

/// Value-type description of a graph
///
/// Elements and links refer to each other by element id and port name. The
/// graph output is the port `src_elem_port` of the element `src_elem_id`.
#[derive(Clone, Debug, PartialEq)]
pub struct GraphClass {
    name: String,
    id: String,
    src_elem_id: String,
    src_elem_port: String,
    elements: Vec<ElementDesc>,
    links: Vec<Link>,
}

impl GraphClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: random_id(),
            src_elem_id: String::new(),
            src_elem_port: String::new(),
            elements: Vec::new(),
            links: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn src_elem_id(&self) -> &str {
        &self.src_elem_id
    }

    #[inline]
    pub fn src_elem_port(&self) -> &str {
        &self.src_elem_port
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Route the output port `port` of element `elem_id` out of the graph
    pub fn set_graph_output(&mut self, elem_id: impl Into<String>, port: impl Into<String>) {
        self.src_elem_id = elem_id.into();
        self.src_elem_port = port.into();
    }

    pub fn add_element(&mut self, desc: ElementDesc) -> &mut ElementDesc {
        self.elements.push(desc);
        let last = self.elements.len() - 1;
        &mut self.elements[last]
    }

    pub fn add_link(&mut self, link: Link) {
        self.links.push(link);
    }

    /// Add a link with a fresh id
    pub fn link(&mut self, src_elem: &str, src_port: &str, dst_elem: &str, dst_port: &str) -> &Link {
        self.links.push(Link {
            id: random_id(),
            src_element: src_elem.to_string(),
            src_port: src_port.to_string(),
            dst_element: dst_elem.to_string(),
            dst_port: dst_port.to_string(),
        });
        let last = self.links.len() - 1;
        &self.links[last]
    }

    #[inline]
    pub fn elements(&self) -> &[ElementDesc] {
        &self.elements
    }

    #[inline]
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn find_element_by_id(&self, id: &str) -> Option<&ElementDesc> {
        self.elements.iter().find(|e| e.id == id)
    }

    pub fn find_element_by_id_mut(&mut self, id: &str) -> Option<&mut ElementDesc> {
        self.elements.iter_mut().find(|e| e.id == id)
    }

    pub fn find_element_by_name(&self, name: &str) -> Option<&ElementDesc> {
        self.elements.iter().find(|e| e.name == name)
    }

    pub fn find_link_by_id(&self, id: &str) -> Option<&Link> {
        self.links.iter().find(|l| l.id == id)
    }

    /// The link leaving output port `port` of element `elem_id`
    pub fn find_link_by_src(&self, elem_id: &str, port: &str) -> Option<&Link> {
        self.links
            .iter()
            .find(|l| l.src_element == elem_id && l.src_port == port)
    }

    /// The link arriving at input port `port` of element `elem_id`
    pub fn find_link_by_dst(&self, elem_id: &str, port: &str) -> Option<&Link> {
        self.links
            .iter()
            .find(|l| l.dst_element == elem_id && l.dst_port == port)
    }

    pub fn delete_link_by_id(&mut self, id: &str) {
        self.links.retain(|l| l.id != id);
    }

    /// Remove an element together with every link touching it
    pub fn delete_element_by_id(&mut self, id: &str) {
        self.elements.retain(|e| e.id != id);
        self.links
            .retain(|l| l.src_element != id && l.dst_element != id);
        if self.src_elem_id == id {
            self.src_elem_id.clear();
            self.src_elem_port.clear();
        }
    }

    /// Content hash
    ///
    /// Elements and links are hashed in insertion order, element arguments
    /// in key order.
    pub fn hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.name.hash(&mut hasher);
        self.id.hash(&mut hasher);
        self.src_elem_id.hash(&mut hasher);
        self.src_elem_port.hash(&mut hasher);
        for link in &self.links {
            link.hash(&mut hasher);
        }
        for elem in &self.elements {
            elem.id.hash(&mut hasher);
            elem.name.hash(&mut hasher);
            elem.kind.hash(&mut hasher);
            for (key, arg) in elem.args.iter().sorted_by(|a, b| a.0.cmp(b.0)) {
                key.hash(&mut hasher);
                arg.hash(&mut hasher);
            }
            elem.input_ports.hash(&mut hasher);
            elem.output_ports.hash(&mut hasher);
        }
        hasher.finish()
    }

    pub fn into_json(&self) -> Value {
        let links: Vec<Value> = self
            .links
            .iter()
            .map(|link| {
                json!({
                    "id": link.id,
                    "src_elem": link.src_element,
                    "src_port": link.src_port,
                    "dst_elem": link.dst_element,
                    "dst_port": link.dst_port,
                })
            })
            .collect();

        let elements: Vec<Value> = self
            .elements
            .iter()
            .map(|elem| {
                let mut obj = Map::new();
                obj.insert("id".into(), Value::String(elem.id.clone()));
                obj.insert("name".into(), Value::String(elem.name.clone()));
                obj.insert("type".into(), Value::String(elem.kind.clone()));
                for (key, arg) in elem.args.iter().sorted_by(|a, b| a.0.cmp(b.0)) {
                    obj.insert(format!("arg_{}", key), arg.to_json());
                }
                obj.insert("input_ports".into(), ports_to_json(&elem.input_ports));
                obj.insert("output_ports".into(), ports_to_json(&elem.output_ports));
                Value::Object(obj)
            })
            .collect();

        json!({
            "name": self.name,
            "id": self.id,
            "src_elem_id": self.src_elem_id,
            "src_elem_port": self.src_elem_port,
            "links": links,
            "elements": elements,
        })
    }

    /// Rebuild a class from `into_json` output
    ///
    /// Elements of an unknown type are skipped with a warning. Arguments that
    /// are missing or of the wrong type keep their default values.
    pub fn from_json(value: &Value) -> Result<Self, GraphClassError> {
        let obj = value.as_object().ok_or(GraphClassError::NotAnObject)?;
        let mut class = GraphClass {
            name: str_key(obj, "name")?,
            id: str_key(obj, "id")?,
            src_elem_id: str_key(obj, "src_elem_id")?,
            src_elem_port: str_key(obj, "src_elem_port")?,
            elements: Vec::new(),
            links: Vec::new(),
        };

        for link in array_key(obj, "links")? {
            let link = link.as_object().ok_or(GraphClassError::Key("links"))?;
            class.links.push(Link {
                id: str_key(link, "id")?,
                src_element: str_key(link, "src_elem")?,
                src_port: str_key(link, "src_port")?,
                dst_element: str_key(link, "dst_elem")?,
                dst_port: str_key(link, "dst_port")?,
            });
        }

        for elem in array_key(obj, "elements")? {
            let elem = elem.as_object().ok_or(GraphClassError::Key("elements"))?;
            let kind = str_key(elem, "type")?;
            let Some(template) = find_element_desc(&kind) else {
                warn!(class = %class.name, kind = %kind, "skipping element of unknown type");
                continue;
            };

            let mut desc = template.clone();
            desc.id = str_key(elem, "id")?;
            desc.name = str_key(elem, "name")?;
            for (key, arg) in desc.args.iter_mut() {
                let Some(value) = elem.get(&format!("arg_{}", key)) else {
                    debug!(elem = %desc.name, arg = %key, "argument missing, using default");
                    continue;
                };
                if !arg.read_json(value) {
                    warn!(elem = %desc.name, arg = %key, "argument has the wrong type, using default");
                }
            }
            if let Some(ports) = elem.get("input_ports") {
                desc.input_ports = ports_from_json(ports)?;
            }
            if let Some(ports) = elem.get("output_ports") {
                desc.output_ports = ports_from_json(ports)?;
            }
            class.elements.push(desc);
        }
        Ok(class)
    }

    /// Warm the PCM cache by decoding every caching file source once
    ///
    /// The decoded audio is thrown away. Only has an effect when
    /// `params.enable_pcm_caching` is set.
    pub fn preload(&self, loader: &dyn Loader, params: &PrepareParams) {
        if !params.enable_pcm_caching {
            return;
        }
        let caching = |desc: &&ElementDesc| {
            desc.kind == "FileSource"
                && matches!(desc.arg("pcm_caching"), Some(ElementArg::Bool(true)))
        };

        for desc in self.elements.iter().filter(caching) {
            let mut desc = desc.clone();
            desc.set_arg("loops", ElementArg::Uint(1));
            let mut elem = match create_element(&desc) {
                Ok(elem) => elem,
                Err(e) => {
                    warn!(elem = %desc.name, error = %e, "failed to create file source for preload");
                    continue;
                }
            };
            if let Err(e) = elem.prepare(loader, params) {
                warn!(elem = %desc.name, error = %e, "failed to prepare file source for preload");
                continue;
            }

            debug!(elem = %desc.name, "preloading file source");
            let mut events = EventQueue::new();
            while !elem.is_source_done() {
                elem.process(&HeapAllocator, &mut events, 1000);
                drop(elem.output_port_mut(0).pull_buffer());
            }
            elem.shutdown();
        }
    }
}

fn str_key(obj: &Map<String, Value>, key: &'static str) -> Result<String, GraphClassError> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(GraphClassError::Key(key))
}

fn array_key<'a>(obj: &'a Map<String, Value>, key: &'static str) -> Result<&'a Vec<Value>, GraphClassError> {
    obj.get(key)
        .and_then(Value::as_array)
        .ok_or(GraphClassError::Key(key))
}

fn ports_to_json(ports: &[PortDesc]) -> Value {
    Value::Array(ports.iter().map(|p| json!({ "name": p.name })).collect())
}

fn ports_from_json(value: &Value) -> Result<Vec<PortDesc>, GraphClassError> {
    let ports = value.as_array().ok_or(GraphClassError::Key("ports"))?;
    ports
        .iter()
        .map(|p| {
            p.get("name")
                .and_then(Value::as_str)
                .map(PortDesc::new)
                .ok_or(GraphClassError::Key("name"))
        })
        .collect()
}
