//! Schema registry: structs, fields, permission tables, effects and checks.

use std::collections::{BTreeMap, BTreeSet};

use sha2::{Digest, Sha256};
use tracing::info;

use super::expr::{parse_expression, Expression};
use super::path::{parse_path_list, PathString};
use super::values::{Leaf, LeafKind};
use super::EvalError;
use crate::config::EngineConfig;

// ──────────────────────────────────────────────
// Fields
// ──────────────────────────────────────────────

/// Declared type of a field: a primitive leaf kind or a reference to
/// another struct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Primitive(LeafKind),
    Other(String),
}

impl FieldType {
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Primitive(kind) => kind.name(),
            FieldType::Other(_) => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub ty: FieldType,
    pub default: Option<Leaf>,
}

impl Field {
    /// Target struct name when this is an `other` field.
    pub fn target(&self) -> Option<&str> {
        match &self.ty {
            FieldType::Other(target) => Some(target),
            FieldType::Primitive(_) => None,
        }
    }
}

// ──────────────────────────────────────────────
// Permissions
// ──────────────────────────────────────────────

/// A field that can anchor ownership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipRule {
    pub field: String,
    pub guard: Expression,
}

/// Delegated, read-only ownership keyed by an ownership field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BorrowRule {
    /// Ownership field this rule substitutes for.
    pub field: String,
    pub name: String,
    /// Predicate the actor must satisfy, usually over `_borrow` paths.
    pub prove: Expression,
    /// Ownership paths resolved (read-only) when the borrow is granted.
    pub ownership: Vec<PathString>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grant {
    pub read: Vec<PathString>,
    pub write: Vec<PathString>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permissions {
    pub ownership: Vec<OwnershipRule>,
    pub borrow: BTreeMap<String, BorrowRule>,
    /// Grants keyed by owning field.
    pub private: BTreeMap<String, Grant>,
    /// Visible to anyone who proves any ownership.
    pub public: Vec<PathString>,
}

// ──────────────────────────────────────────────
// Effects and checks
// ──────────────────────────────────────────────

/// One `target = expr` statement. Targets are rooted at `_prev` or `_curr`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutateStatement {
    pub target: PathString,
    pub expr: Expression,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Effect {
    pub name: String,
    pub dependencies: Vec<PathString>,
    pub mutate: Vec<MutateStatement>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub name: String,
    pub expr: Expression,
    pub error_code: String,
}

// ──────────────────────────────────────────────
// Struct
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Struct {
    pub name: String,
    pub fields: BTreeMap<String, Field>,
    pub unique: Vec<Vec<String>>,
    pub permissions: Permissions,
    pub effects: Vec<Effect>,
    pub checks: Vec<Check>,
}

impl Struct {
    /// A struct with the given fields and no rules.
    pub fn new(name: &str, fields: Vec<Field>) -> Struct {
        Struct {
            name: name.to_string(),
            fields: fields.into_iter().map(|f| (f.name.clone(), f)).collect(),
            unique: Vec::new(),
            permissions: Permissions::default(),
            effects: Vec::new(),
            checks: Vec::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    /// First-hop names of the ownership rules, in declared order.
    pub fn ownership_fields(&self) -> Vec<&str> {
        self.permissions
            .ownership
            .iter()
            .map(|r| r.field.as_str())
            .collect()
    }

    /// Canonical JSON of the whole struct, used for fingerprinting.
    pub fn serialize(&self) -> serde_json::Value {
        let paths = |ps: &[PathString]| -> Vec<String> { ps.iter().map(|p| p.to_string()).collect() };

        let fields: serde_json::Map<String, serde_json::Value> = self
            .fields
            .values()
            .map(|f| {
                let mut decl = serde_json::json!({ "type": f.ty.name() });
                if let Some(target) = f.target() {
                    decl["struct"] = serde_json::json!(target);
                }
                if let Some(default) = &f.default {
                    decl["default"] = default.serialize();
                }
                (f.name.clone(), decl)
            })
            .collect();

        let ownership: Vec<serde_json::Value> = self
            .permissions
            .ownership
            .iter()
            .map(|r| serde_json::json!({ "field": r.field, "guard": r.guard.serialize() }))
            .collect();
        let borrow: serde_json::Map<String, serde_json::Value> = self
            .permissions
            .borrow
            .iter()
            .map(|(k, r)| {
                (
                    k.clone(),
                    serde_json::json!({
                        "name": r.name,
                        "prove": r.prove.serialize(),
                        "ownership": paths(&r.ownership),
                    }),
                )
            })
            .collect();
        let private: serde_json::Map<String, serde_json::Value> = self
            .permissions
            .private
            .iter()
            .map(|(k, g)| {
                (
                    k.clone(),
                    serde_json::json!({ "read": paths(&g.read), "write": paths(&g.write) }),
                )
            })
            .collect();

        let effects: serde_json::Map<String, serde_json::Value> = self
            .effects
            .iter()
            .map(|e| {
                let mutate: Vec<serde_json::Value> = e
                    .mutate
                    .iter()
                    .map(|m| serde_json::json!({ "target": m.target.to_string(), "expr": m.expr.serialize() }))
                    .collect();
                (
                    e.name.clone(),
                    serde_json::json!({ "dependencies": paths(&e.dependencies), "mutate": mutate }),
                )
            })
            .collect();
        let checks: serde_json::Map<String, serde_json::Value> = self
            .checks
            .iter()
            .map(|c| {
                (
                    c.name.clone(),
                    serde_json::json!({ "expr": c.expr.serialize(), "error": c.error_code }),
                )
            })
            .collect();

        serde_json::json!({
            "kind": "Struct",
            "id": self.name,
            "fields": fields,
            "unique": self.unique,
            "permissions": {
                "ownership": ownership,
                "borrow": borrow,
                "private": private,
                "public": paths(&self.permissions.public),
            },
            "effects": effects,
            "checks": checks,
        })
    }
}

// ──────────────────────────────────────────────
// Registry
// ──────────────────────────────────────────────

/// Read-only set of structs, resolved by name. Passed explicitly to every
/// resolver and evaluator entry point.
#[derive(Debug, Clone)]
pub struct Registry {
    pub id: String,
    structs: BTreeMap<String, Struct>,
    config: EngineConfig,
}

impl Registry {
    /// Build a registry from already-constructed structs. No validation.
    pub fn new(id: &str, structs: Vec<Struct>, config: EngineConfig) -> Registry {
        Registry {
            id: id.to_string(),
            structs: structs.into_iter().map(|s| (s.name.clone(), s)).collect(),
            config,
        }
    }

    /// Load and validate a registry from a schema bundle.
    pub fn from_interchange(
        bundle: &serde_json::Value,
        config: EngineConfig,
    ) -> Result<Registry, EvalError> {
        let parsed = graft_interchange::from_interchange(bundle)?;
        let mut seen = BTreeSet::new();
        for c in parsed.structs() {
            if !seen.insert(c.id.as_str()) {
                return Err(EvalError::schema(format!(
                    "duplicate struct '{}'{}",
                    c.id,
                    source_location(c)
                )));
            }
        }
        let structs = parsed
            .structs()
            .map(struct_from_construct)
            .collect::<Result<Vec<_>, _>>()?;
        let registry = Registry::new(&parsed.id, structs, config);
        crate::validate::validate_registry(&registry)?;
        info!(
            schema = %registry.id,
            structs = registry.structs.len(),
            fingerprint = %registry.fingerprint(),
            "schema registry loaded"
        );
        Ok(registry)
    }

    pub fn lookup_struct(&self, name: &str) -> Option<&Struct> {
        self.structs.get(name)
    }

    /// Like [`Registry::lookup_struct`] but an unknown name is an error.
    pub fn get(&self, name: &str) -> Result<&Struct, EvalError> {
        self.lookup_struct(name)
            .ok_or_else(|| EvalError::schema(format!("unknown struct '{}'", name)))
    }

    pub fn structs(&self) -> impl Iterator<Item = &Struct> {
        self.structs.values()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Name of the struct ownership paths must terminate at.
    pub fn user_struct(&self) -> &str {
        &self.config.engine.user_struct
    }

    /// Walk `path` from `start` through `other` fields and return the
    /// terminal field declaration.
    pub fn field_at<'a>(&'a self, start: &'a Struct, path: &PathString) -> Result<&'a Field, EvalError> {
        let unknown = || EvalError::UnknownField {
            path: format!("{}.{}", start.name, path),
        };
        let (last, hops) = path.segments().split_last().ok_or_else(unknown)?;
        let mut current = start;
        for hop in hops {
            let target = current
                .field(hop)
                .and_then(Field::target)
                .ok_or_else(unknown)?;
            current = self.lookup_struct(target).ok_or_else(unknown)?;
        }
        current.field(last).ok_or_else(unknown)
    }

    /// SHA-256 over the canonical JSON of every struct, sorted by name.
    pub fn fingerprint(&self) -> String {
        let canonical: Vec<serde_json::Value> = self.structs.values().map(Struct::serialize).collect();
        let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
        format!("{:x}", Sha256::digest(&bytes))
    }
}

// ──────────────────────────────────────────────
// Interchange conversion
// ──────────────────────────────────────────────

/// ` (file:line)` when the construct carries provenance, else empty.
fn source_location(c: &graft_interchange::StructConstruct) -> String {
    c.provenance
        .as_ref()
        .map(|p| format!(" ({}:{})", p.file, p.line))
        .unwrap_or_default()
}

fn struct_from_construct(c: &graft_interchange::StructConstruct) -> Result<Struct, EvalError> {
    let location = source_location(c);
    let in_struct = |e: EvalError| {
        let detail = match e {
            EvalError::InvalidSchema { message } => message,
            other => other.to_string(),
        };
        EvalError::schema(format!("struct '{}'{}: {}", c.id, location, detail))
    };

    let mut fields = BTreeMap::new();
    for (name, f) in &c.fields {
        let ty = match f.field_type.as_str() {
            "other" => FieldType::Other(f.target.clone().unwrap_or_default()),
            other => FieldType::Primitive(LeafKind::from_name(other).ok_or_else(|| {
                in_struct(EvalError::schema(format!(
                    "field '{}' has unknown type '{}'",
                    name, other
                )))
            })?),
        };
        let default = match (&ty, &f.default) {
            (FieldType::Primitive(kind), Some(raw)) => {
                Some(Leaf::from_json(*kind, raw).map_err(in_struct)?)
            }
            (FieldType::Other(_), Some(_)) => {
                return Err(in_struct(EvalError::schema(format!(
                    "other field '{}' cannot declare a default",
                    name
                ))))
            }
            (_, None) => None,
        };
        fields.insert(
            name.clone(),
            Field {
                name: name.clone(),
                ty,
                default,
            },
        );
    }

    Ok(Struct {
        name: c.id.clone(),
        fields,
        unique: c.unique.clone(),
        permissions: parse_permissions(c).map_err(in_struct)?,
        effects: parse_effects(c.effects.as_ref()).map_err(in_struct)?,
        checks: parse_checks(c.checks.as_ref()).map_err(in_struct)?,
    })
}

fn object<'a>(
    v: &'a serde_json::Value,
    what: &str,
) -> Result<&'a serde_json::Map<String, serde_json::Value>, EvalError> {
    v.as_object()
        .ok_or_else(|| EvalError::schema(format!("{} must be an object", what)))
}

fn parse_permissions(c: &graft_interchange::StructConstruct) -> Result<Permissions, EvalError> {
    let mut permissions = Permissions::default();

    if let Some(rules) = c.ownership() {
        let arr = rules
            .as_array()
            .ok_or_else(|| EvalError::schema("'ownership' must be an array"))?;
        for rule in arr {
            let field = rule
                .get("field")
                .and_then(|f| f.as_str())
                .ok_or_else(|| EvalError::schema("ownership rule missing 'field'"))?
                .to_string();
            let guard = match rule.get("guard") {
                Some(g) if !g.is_null() => parse_expression(g)?,
                _ => Expression::boolean(true),
            };
            permissions.ownership.push(OwnershipRule { field, guard });
        }
    }

    if let Some(table) = c.borrow() {
        for (field, rule) in object(table, "'borrow'")? {
            let name = rule
                .get("name")
                .and_then(|n| n.as_str())
                .unwrap_or(field)
                .to_string();
            let prove = parse_expression(
                rule.get("prove")
                    .ok_or_else(|| EvalError::schema(format!("borrow '{}' missing 'prove'", name)))?,
            )?;
            let ownership = parse_path_list(
                rule.get("ownership")
                    .ok_or_else(|| EvalError::schema(format!("borrow '{}' missing 'ownership'", name)))?,
                "borrow ownership",
            )?;
            permissions.borrow.insert(
                field.clone(),
                BorrowRule {
                    field: field.clone(),
                    name,
                    prove,
                    ownership,
                },
            );
        }
    }

    if let Some(table) = c.private() {
        for (field, grant) in object(table, "'private'")? {
            let list = |key: &str| match grant.get(key) {
                Some(v) => parse_path_list(v, key),
                None => Ok(Vec::new()),
            };
            permissions.private.insert(
                field.clone(),
                Grant {
                    read: list("read")?,
                    write: list("write")?,
                },
            );
        }
    }

    if let Some(public) = c.public() {
        permissions.public = parse_path_list(public, "'public'")?;
    }

    Ok(permissions)
}

fn parse_effects(table: Option<&serde_json::Value>) -> Result<Vec<Effect>, EvalError> {
    let Some(table) = table else {
        return Ok(Vec::new());
    };
    let mut effects = Vec::new();
    for (name, body) in object(table, "'effects'")? {
        let dependencies = match body.get("dependencies") {
            Some(v) => parse_path_list(v, "effect dependencies")?,
            None => Vec::new(),
        };
        let statements = body
            .get("mutate")
            .and_then(|m| m.as_array())
            .ok_or_else(|| EvalError::schema(format!("effect '{}' missing 'mutate' array", name)))?;
        let mut mutate = Vec::with_capacity(statements.len());
        for stmt in statements {
            let target = stmt
                .get("target")
                .and_then(|t| t.as_str())
                .ok_or_else(|| EvalError::schema(format!("effect '{}' statement missing 'target'", name)))?;
            let expr = stmt
                .get("expr")
                .ok_or_else(|| EvalError::schema(format!("effect '{}' statement missing 'expr'", name)))?;
            mutate.push(MutateStatement {
                target: PathString::parse(target)?,
                expr: parse_expression(expr)?,
            });
        }
        effects.push(Effect {
            name: name.clone(),
            dependencies,
            mutate,
        });
    }
    Ok(effects)
}

fn parse_checks(table: Option<&serde_json::Value>) -> Result<Vec<Check>, EvalError> {
    let Some(table) = table else {
        return Ok(Vec::new());
    };
    let mut checks = Vec::new();
    for (name, body) in object(table, "'checks'")? {
        let expr = body
            .get("expr")
            .ok_or_else(|| EvalError::schema(format!("check '{}' missing 'expr'", name)))?;
        let error_code = body
            .get("error")
            .and_then(|e| e.as_str())
            .unwrap_or(name)
            .to_string();
        checks.push(Check {
            name: name.clone(),
            expr: parse_expression(expr)?,
            error_code,
        });
    }
    Ok(checks)
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
