#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use onboarding_core::errors::RemoteError;
use onboarding_core::remote::{Method, RemoteGateway, RemoteRequest};
use onboarding_core::wizard::{FieldMap, MemoryNotifier};
use serde_json::{json, Value};

/// Records every request and answers from a script keyed by `"METHOD path"`.
#[derive(Default)]
pub struct FakeGateway {
    responses: Mutex<BTreeMap<String, Value>>,
    failures: Mutex<BTreeMap<String, (u16, Value)>>,
    seen: Mutex<Vec<RemoteRequest>>,
}

fn key(method: Method, path: &str) -> String {
    format!("{} {}", method.as_str(), path)
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, method: Method, path: &str, body: Value) {
        self.responses.lock().unwrap().insert(key(method, path), body);
    }

    pub fn fail(&self, method: Method, path: &str, status: u16, body: Value) {
        self.failures
            .lock()
            .unwrap()
            .insert(key(method, path), (status, body));
    }

    /// Drops a scripted failure so the next matching request succeeds.
    pub fn recover(&self, method: Method, path: &str) {
        self.failures.lock().unwrap().remove(&key(method, path));
    }

    pub fn requests(&self) -> Vec<RemoteRequest> {
        self.seen.lock().unwrap().clone()
    }

    pub fn paths(&self, method: Method) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|request| request.method == method)
            .map(|request| request.path)
            .collect()
    }

    pub fn body_of(&self, method: Method, path: &str) -> Option<Value> {
        self.requests()
            .into_iter()
            .find(|request| request.method == method && request.path == path)
            .and_then(|request| request.body)
    }

    pub fn mutated_paths(&self) -> BTreeSet<String> {
        self.requests()
            .into_iter()
            .filter(|request| request.method != Method::Get)
            .map(|request| request.path)
            .collect()
    }
}

#[async_trait]
impl RemoteGateway for FakeGateway {
    async fn send(&self, request: &RemoteRequest) -> Result<Value, RemoteError> {
        self.seen.lock().unwrap().push(request.clone());
        let key = key(request.method, &request.path);
        if let Some((status, body)) = self.failures.lock().unwrap().get(&key) {
            return Err(RemoteError::from_status(*status, body));
        }
        Ok(self
            .responses
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or(Value::Null))
    }
}

pub fn notifier() -> Arc<MemoryNotifier> {
    Arc::new(MemoryNotifier::new())
}

pub fn values(value: Value) -> FieldMap {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

/// Student payload as returned by `GET /alunos/usuario/{id}`.
pub fn student_record() -> Value {
    json!({
        "id": "aluno-1",
        "nome_completo": "Ana Souza",
        "cpf": "12345678901",
        "telefone": "11987654321",
        "data_nascimento": "1994-03-12T00:00:00.000Z",
        "genero": "FEMININO",
        "email": null,
        "plano_saude": "Unimed",
        "alergias": null
    })
}
