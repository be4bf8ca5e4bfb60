//! Declarative description of the file operations exposed per record.
//!
//! The router mounts routes from this table and `GET /methods` publishes it,
//! so the table is the single place verbs, paths and argument bindings are
//! declared.

use axum::routing::MethodFilter;
use serde::Serialize;

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Verb {
    pub fn method_filter(self) -> MethodFilter {
        match self {
            Verb::Get => MethodFilter::GET,
            Verb::Post => MethodFilter::POST,
            Verb::Put => MethodFilter::PUT,
            Verb::Patch => MethodFilter::PATCH,
            Verb::Delete => MethodFilter::DELETE,
        }
    }
}

/// Where an argument is taken from.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HttpSource {
    Path,
    Query,
    Req,
    Res,
}

#[derive(Serialize, Debug)]
pub struct Accepts {
    pub arg: &'static str,
    #[serde(rename = "type")]
    pub ty: &'static str,
    pub required: bool,
    pub source: HttpSource,
}

#[derive(Serialize, Debug)]
pub struct Returns {
    pub arg: &'static str,
    #[serde(rename = "type")]
    pub ty: &'static str,
    pub root: bool,
}

#[derive(Serialize, Debug)]
pub struct HttpRoute {
    pub verb: Verb,
    /// Path template relative to the record, `:name` marks a path argument.
    pub path: &'static str,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMethod {
    pub name: &'static str,
    pub shared: bool,
    pub is_static: bool,
    pub accepts: &'static [Accepts],
    pub returns: Option<Returns>,
    pub http: HttpRoute,
}

const FILE_ARG: Accepts = Accepts {
    arg: "file",
    ty: "string",
    required: true,
    source: HttpSource::Path,
};
const RAW_ARG: Accepts = Accepts {
    arg: "raw",
    ty: "boolean",
    required: false,
    source: HttpSource::Query,
};
const REQ_ARG: Accepts = Accepts {
    arg: "req",
    ty: "object",
    required: false,
    source: HttpSource::Req,
};
const RES_ARG: Accepts = Accepts {
    arg: "res",
    ty: "object",
    required: false,
    source: HttpSource::Res,
};

pub static REMOTE_METHODS: &[RemoteMethod] = &[
    RemoteMethod {
        name: "file",
        shared: true,
        is_static: false,
        accepts: &[FILE_ARG, RAW_ARG],
        returns: Some(Returns {
            arg: "file",
            ty: "object",
            root: true,
        }),
        http: HttpRoute {
            verb: Verb::Get,
            path: "/files/:file",
        },
    },
    RemoteMethod {
        name: "removeFile",
        shared: true,
        is_static: false,
        accepts: &[FILE_ARG],
        returns: None,
        http: HttpRoute {
            verb: Verb::Delete,
            path: "/files/:file",
        },
    },
    RemoteMethod {
        name: "upload",
        shared: true,
        is_static: false,
        accepts: &[REQ_ARG, RES_ARG],
        returns: Some(Returns {
            arg: "result",
            ty: "object",
            root: false,
        }),
        http: HttpRoute {
            verb: Verb::Post,
            path: "/files/upload",
        },
    },
    RemoteMethod {
        name: "download",
        shared: true,
        is_static: false,
        accepts: &[FILE_ARG, REQ_ARG, RES_ARG],
        returns: None,
        http: HttpRoute {
            verb: Verb::Get,
            path: "/download/:file",
        },
    },
];

impl RemoteMethod {
    pub fn find(name: &str) -> Option<&'static RemoteMethod> {
        REMOTE_METHODS.iter().find(|method| method.name == name)
    }

    /// Router path: instance methods sit under the record id.
    pub fn route_path(&self) -> String {
        let relative = self
            .http
            .path
            .split('/')
            .map(|segment| match segment.strip_prefix(':') {
                Some(param) => format!("{{{}}}", param),
                None => segment.to_string(),
            })
            .collect::<Vec<_>>()
            .join("/");
        if self.is_static {
            relative
        } else {
            format!("/{{id}}{}", relative)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn converts_templates_to_router_paths() {
        let paths: Vec<String> = REMOTE_METHODS.iter().map(RemoteMethod::route_path).collect();
        assert_eq!(
            paths,
            vec![
                "/{id}/files/{file}",
                "/{id}/files/{file}",
                "/{id}/files/upload",
                "/{id}/download/{file}",
            ]
        );
    }

    #[test]
    fn every_method_is_instance_scoped() {
        assert!(REMOTE_METHODS.iter().all(|m| m.shared && !m.is_static));
        assert_eq!(
            RemoteMethod::find("removeFile").map(|m| m.http.verb),
            Some(Verb::Delete)
        );
        assert!(RemoteMethod::find("create").is_none());
    }

    #[test]
    fn publishes_argument_bindings() {
        let download = serde_json::to_value(RemoteMethod::find("download").unwrap()).unwrap();
        assert_eq!(
            download["accepts"],
            json!([
                {"arg": "file", "type": "string", "required": true, "source": "path"},
                {"arg": "req", "type": "object", "required": false, "source": "req"},
                {"arg": "res", "type": "object", "required": false, "source": "res"}
            ])
        );
        assert_eq!(download["http"], json!({"verb": "get", "path": "/download/:file"}));
        assert_eq!(download["isStatic"], json!(false));
    }
}
