use std::sync::Arc;

use async_graphql::{EmptySubscription, Request, Schema, Variables};
use serde_json::{json, Value};
use uuid::Uuid;

use ticket_desk::{
    InMemoryTicketStore, SupportConfig, SupportMutations, SupportQueries, SupportService, Unlimited, Viewer,
};

type SupportSchema = Schema<SupportQueries, SupportMutations, EmptySubscription>;

fn schema() -> SupportSchema {
    let service = Arc::new(SupportService::new(
        Arc::new(InMemoryTicketStore::new()),
        Arc::new(Unlimited),
        SupportConfig::default(),
    ));
    Schema::build(SupportQueries, SupportMutations, EmptySubscription)
        .data(service)
        .finish()
}

async fn run(schema: &SupportSchema, viewer: Option<Viewer>, query: &str, variables: Value) -> Value {
    let mut request = Request::new(query).variables(Variables::from_json(variables));
    if let Some(viewer) = viewer {
        request = request.data(viewer);
    }
    serde_json::to_value(schema.execute(request).await).unwrap()
}

const CREATE: &str = r#"
    mutation Create($body: String!) {
        createSupportTicket(input: { bindType: "billing", body: $body }) {
            id status bindType unreadForUser unreadForAdmin
        }
    }
"#;

#[tokio::test]
async fn user_creates_and_admin_replies() {
    let schema = schema();
    let user = Viewer::user(Uuid::new_v4());
    let admin = Viewer::admin(Uuid::new_v4());

    let created = run(&schema, Some(user), CREATE, json!({ "body": "Refund request" })).await;
    let ticket = &created["data"]["createSupportTicket"];
    assert_eq!(ticket["status"], "OPEN");
    assert_eq!(ticket["bindType"], "BILLING");
    assert_eq!(ticket["unreadForAdmin"], true);
    assert_eq!(ticket["unreadForUser"], false);
    let id = ticket["id"].as_str().unwrap().to_string();

    let reply = run(
        &schema,
        Some(admin),
        r#"mutation Reply($id: UUID!) {
            addTicketMessage(input: { ticketId: $id, body: "Refund issued" }) { authorRole body }
        }"#,
        json!({ "id": id }),
    )
    .await;
    assert_eq!(reply["data"]["addTicketMessage"]["authorRole"], "ADMIN");

    let counts = run(&schema, Some(user), "{ supportUnreadCount }", json!({})).await;
    assert_eq!(counts["data"]["supportUnreadCount"], 1);

    let thread = run(
        &schema,
        Some(user),
        r#"query Thread($id: UUID!) {
            supportTicket(id: $id) { slaStatus ticket { status } messages { body } }
        }"#,
        json!({ "id": id }),
    )
    .await;
    let thread = &thread["data"]["supportTicket"];
    assert_eq!(thread["ticket"]["status"], "PENDING_USER");
    assert_eq!(thread["slaStatus"], "ON_TRACK");
    assert_eq!(thread["messages"].as_array().unwrap().len(), 2);

    let read = run(
        &schema,
        Some(user),
        "mutation Read($id: UUID!) { markTicketRead(id: $id) }",
        json!({ "id": id }),
    )
    .await;
    assert_eq!(read["data"]["markTicketRead"], true);
    let counts = run(&schema, Some(user), "{ supportUnreadCount }", json!({})).await;
    assert_eq!(counts["data"]["supportUnreadCount"], 0);
}

#[tokio::test]
async fn admin_queries_reject_users_with_code() {
    let schema = schema();
    let user = Viewer::user(Uuid::new_v4());

    let response = run(&schema, Some(user), "{ supportTickets { total } }", json!({})).await;
    assert_eq!(response["errors"][0]["extensions"]["code"], "FORBIDDEN");

    let response = run(&schema, None, "{ mySupportTickets { total } }", json!({})).await;
    assert_eq!(response["errors"][0]["extensions"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn admin_lists_and_closes_tickets() {
    let schema = schema();
    let user = Viewer::user(Uuid::new_v4());
    let admin = Viewer::admin(Uuid::new_v4());
    for body in ["first", "second", "third"] {
        run(&schema, Some(user), CREATE, json!({ "body": body })).await;
    }

    let listed = run(
        &schema,
        Some(admin),
        r#"{ supportTickets(filter: { bindType: BILLING, slaStatus: ON_TRACK }, page: 1, limit: 2) {
            total pages items { slaStatus ticket { id } }
        } }"#,
        json!({}),
    )
    .await;
    let page = &listed["data"]["supportTickets"];
    assert_eq!(page["total"], 3);
    assert_eq!(page["pages"], 2);
    assert_eq!(page["items"].as_array().unwrap().len(), 2);
    let id = page["items"][0]["ticket"]["id"].as_str().unwrap().to_string();

    let closed = run(
        &schema,
        Some(admin),
        "mutation Close($id: UUID!) { setTicketStatus(id: $id, status: CLOSED) { status } }",
        json!({ "id": id }),
    )
    .await;
    assert_eq!(closed["data"]["setTicketStatus"]["status"], "CLOSED");

    let reply = run(
        &schema,
        Some(user),
        r#"mutation Reply($id: UUID!) {
            addTicketMessage(input: { ticketId: $id, body: "Anyone?" }) { id }
        }"#,
        json!({ "id": id }),
    )
    .await;
    assert_eq!(reply["errors"][0]["extensions"]["code"], "TERMINAL_STATE");

    let counts = run(&schema, Some(admin), "{ supportAdminUnreadCount }", json!({})).await;
    assert_eq!(counts["data"]["supportAdminUnreadCount"], 3);
}
