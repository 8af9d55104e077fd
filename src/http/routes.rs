use std::sync::Arc;

use tracing::error;

use super::request::Request;
use super::response::Response;
use crate::service::{ServiceError, TaskService};
use crate::task::Task;

/// Maps requests on `/tasks` to `TaskService` calls.
///
/// ```text
/// GET    /tasks[?id=]             one task, or all of them
/// GET    /tasks/findByName?name=  tasks whose name contains `name`
/// PUT    /tasks                   create or replace
/// DELETE /tasks/{id}              remove
/// PUT    /tasks/{id}/executions   run the command once
/// ```
pub struct Router {
    service: Arc<TaskService>,
}

impl Router {
    pub fn new(service: Arc<TaskService>) -> Self {
        Self { service }
    }

    pub async fn handle(&self, request: &Request) -> Response {
        if request.method == "OPTIONS" {
            return Response::empty(204);
        }

        let segments: Vec<&str> = request.segments.iter().map(String::as_str).collect();
        match (request.method.as_str(), segments.as_slice()) {
            ("GET", ["tasks"]) => self.get_tasks(request.query_param("id")).await,
            ("PUT", ["tasks"]) => self.put_task(&request.body).await,
            ("GET", ["tasks", "findByName"]) => {
                self.find_by_name(request.query_param("name")).await
            }
            ("DELETE", ["tasks", id]) => self.delete_task(id).await,
            ("PUT", ["tasks", id, "executions"]) => self.execute_task(id).await,
            (_, ["tasks"]) | (_, ["tasks", _]) | (_, ["tasks", _, "executions"]) => {
                Response::text(405, "Method not allowed")
            }
            _ => Response::text(404, "Not found"),
        }
    }

    async fn get_tasks(&self, id: Option<&str>) -> Response {
        match id {
            Some(id) => match self.service.get(id).await {
                Ok(task) => Response::json(200, &task),
                Err(e) => error_response(e),
            },
            None => match self.service.list().await {
                Ok(tasks) => Response::json(200, &tasks),
                Err(e) => error_response(e),
            },
        }
    }

    async fn find_by_name(&self, name: Option<&str>) -> Response {
        let Some(name) = name else {
            return Response::text(400, "Missing required parameter: name");
        };
        match self.service.find_by_name(name).await {
            Ok(tasks) if tasks.is_empty() => Response::empty(404),
            Ok(tasks) => Response::json(200, &tasks),
            Err(e) => error_response(e),
        }
    }

    async fn put_task(&self, body: &[u8]) -> Response {
        let task: Task = match serde_json::from_slice(body) {
            Ok(task) => task,
            Err(e) => return Response::text(400, format!("Invalid task body: {e}")),
        };
        match self.service.save(task).await {
            Ok(saved) => Response::json(201, &saved),
            Err(e) => error_response(e),
        }
    }

    async fn delete_task(&self, id: &str) -> Response {
        match self.service.delete(id).await {
            Ok(()) => Response::text(200, format!("Task with ID {id} deleted successfully.")),
            Err(e) => error_response(e),
        }
    }

    async fn execute_task(&self, id: &str) -> Response {
        match self.service.execute(id).await {
            Ok(task) => Response::json(200, &task),
            Err(e) => error_response(e),
        }
    }
}

fn error_response(e: ServiceError) -> Response {
    match e {
        ServiceError::NotFound(_) => Response::text(404, e.to_string()),
        ServiceError::Invalid(_) => Response::text(400, e.to_string()),
        ServiceError::Repository(_) => {
            error!("{e}");
            Response::text(500, "Internal server error")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::fake::FakeBackend;
    use crate::executor::Provisioner;
    use crate::storage::InMemoryTaskRepository;
    use serde_json::{json, Value};
    use std::time::Duration;

    fn router() -> Router {
        let provisioner = Provisioner::new(Arc::new(FakeBackend::new()), "busybox", Duration::from_secs(5))
            .with_poll_interval(Duration::from_millis(1), Duration::from_millis(5));
        let service = TaskService::new(Arc::new(InMemoryTaskRepository::new()), provisioner);
        Router::new(Arc::new(service))
    }

    async fn call(router: &Router, method: &str, target: &str, body: &str) -> Response {
        let request = Request::new(method, target, body.as_bytes().to_vec()).unwrap();
        router.handle(&request).await
    }

    fn json_body(response: &Response) -> Value {
        serde_json::from_slice(&response.body).unwrap()
    }

    fn text_body(response: &Response) -> String {
        String::from_utf8(response.body.clone()).unwrap()
    }

    async fn put_echo(router: &Router) {
        let response = call(
            router,
            "PUT",
            "/tasks",
            r#"{"id":"1","name":"echo","command":"echo hello"}"#,
        )
        .await;
        assert_eq!(response.status, 201);
    }

    #[tokio::test]
    async fn test_put_returns_created_task() {
        let router = router();
        let response = call(&router, "PUT", "/tasks", r#"{"name":"echo","command":"echo hello"}"#).await;

        assert_eq!(response.status, 201);
        let body = json_body(&response);
        assert!(!body["id"].as_str().unwrap().is_empty());
        assert_eq!(body["name"], "echo");
        assert_eq!(body["taskExecutions"], json!([]));
    }

    #[tokio::test]
    async fn test_put_rejects_invalid_json() {
        let router = router();
        let response = call(&router, "PUT", "/tasks", "{not json").await;
        assert_eq!(response.status, 400);
    }

    #[tokio::test]
    async fn test_put_rejects_empty_command() {
        let router = router();
        let response = call(&router, "PUT", "/tasks", r#"{"name":"x","command":" "}"#).await;
        assert_eq!(response.status, 400);
        assert!(text_body(&response).contains("command"));
    }

    #[tokio::test]
    async fn test_get_all_and_by_id() {
        let router = router();
        let response = call(&router, "GET", "/tasks", "").await;
        assert_eq!(response.status, 200);
        assert_eq!(json_body(&response), json!([]));

        put_echo(&router).await;

        let response = call(&router, "GET", "/tasks", "").await;
        assert_eq!(json_body(&response).as_array().unwrap().len(), 1);

        let response = call(&router, "GET", "/tasks?id=1", "").await;
        assert_eq!(response.status, 200);
        assert_eq!(json_body(&response)["command"], "echo hello");
    }

    #[tokio::test]
    async fn test_get_missing_id_is_404() {
        let router = router();
        let response = call(&router, "GET", "/tasks?id=42", "").await;
        assert_eq!(response.status, 404);
        assert_eq!(text_body(&response), "Task with ID 42 not found.");
    }

    #[tokio::test]
    async fn test_find_by_name() {
        let router = router();

        let response = call(&router, "GET", "/tasks/findByName?name=ech", "").await;
        assert_eq!(response.status, 404);
        assert!(response.body.is_empty());

        put_echo(&router).await;

        let response = call(&router, "GET", "/tasks/findByName?name=ech", "").await;
        assert_eq!(response.status, 200);
        let body = json_body(&response);
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["id"], "1");

        let response = call(&router, "GET", "/tasks/findByName", "").await;
        assert_eq!(response.status, 400);
    }

    #[tokio::test]
    async fn test_delete() {
        let router = router();
        put_echo(&router).await;

        let response = call(&router, "DELETE", "/tasks/1", "").await;
        assert_eq!(response.status, 200);
        assert_eq!(text_body(&response), "Task with ID 1 deleted successfully.");

        let response = call(&router, "DELETE", "/tasks/1", "").await;
        assert_eq!(response.status, 404);
        assert_eq!(text_body(&response), "Task with ID 1 not found.");
    }

    #[tokio::test]
    async fn test_execute() {
        let router = router();
        put_echo(&router).await;

        let response = call(&router, "PUT", "/tasks/1/executions", "").await;
        assert_eq!(response.status, 200);

        let body = json_body(&response);
        let executions = body["taskExecutions"].as_array().unwrap();
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0]["status"], "succeeded");
        assert!(executions[0]["output"].as_str().unwrap().contains("hello"));
        assert!(executions[0]["startTime"].is_string());
        assert!(executions[0]["endTime"].is_string());
    }

    #[tokio::test]
    async fn test_execute_missing_task_is_404() {
        let router = router();
        let response = call(&router, "PUT", "/tasks/nope/executions", "").await;
        assert_eq!(response.status, 404);

        let response = call(&router, "GET", "/tasks", "").await;
        assert_eq!(json_body(&response), json!([]));
    }

    #[tokio::test]
    async fn test_unknown_route_and_method() {
        let router = router();
        assert_eq!(call(&router, "GET", "/nope", "").await.status, 404);
        assert_eq!(call(&router, "POST", "/tasks", "").await.status, 405);
        assert_eq!(call(&router, "GET", "/tasks/1/executions", "").await.status, 405);
        assert_eq!(call(&router, "OPTIONS", "/tasks", "").await.status, 204);
    }
}
