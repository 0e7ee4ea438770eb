//! Typed vendor endpoints
//!
//! Publishing-family endpoints (`/api/publish/...`) take the app id as a query
//! parameter and answer with the `ret` envelope. Testing-family endpoints
//! (`/api/app-test/...`) take it as an `appId` header and answer with the
//! `rtnCode` envelope.

use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::api::envelope::{RetEnvelope, RtnCodeEnvelope};
use crate::api::gateway::{ApiCall, ApiGateway};
use crate::core::error::PublishError;
use crate::core::poller::CompileState;

pub const UPLOAD_URL_PATH: &str = "/api/publish/v2/upload-url/for-obs";
pub const TEST_VERSION_PATH: &str = "/api/publish/v2/test/app/version";
pub const TEST_VERSION_SUBMIT_PATH: &str = "/api/publish/v2/test/app/version/submit";
pub const TEST_PACKAGE_PATH: &str = "/api/publish/v2/test/version/pkg";
pub const COMPILE_STATUS_PATH: &str = "/api/publish/v3/package/compile/status";
pub const TEST_GROUP_LIST_PATH: &str = "/api/app-test/v1/test-group/list";
pub const TEST_GROUP_PATH: &str = "/api/app-test/v1/test-group";
pub const INVITATION_CODE_PATH: &str = "/api/app-test/v1/invitation-code";

const APP_ID: &str = "appId";

/// Packages are distributed to testers only
const DISTRIBUTE_MODE_TEST: u8 = 2;
/// Shelf self-detection is not requested for test versions
const ONSHELF_SELF_DETECT: u8 = 0;
/// Display area of an open test, sent as a string
const DISPLAY_AREA: &str = "1";

/// Presigned upload target returned by the upload URL endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTicket {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub object_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestGroup {
    pub group_id: String,
    pub group_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_testers_num: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteCode {
    pub invitation_code: String,
    pub invitation_code_id: String,
}

/// Open-test window attached to a test version, times in epoch milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenTestInfo {
    pub start_time: i64,
    pub end_time: i64,
    pub test_task_info: TestTaskInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestTaskInfo {
    pub group_infos: Vec<GroupInfo>,
    pub display_area: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfo {
    pub group_id: String,
}

impl OpenTestInfo {
    /// Open test for a single tester group
    pub fn for_group(group_id: impl Into<String>, start_time: i64, end_time: i64) -> Self {
        Self {
            start_time,
            end_time,
            test_task_info: TestTaskInfo {
                group_infos: vec![GroupInfo {
                    group_id: group_id.into(),
                }],
                display_area: DISPLAY_AREA.to_string(),
            },
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadUrlResponse {
    url_info: UploadTicket,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateTestVersionRequest<'a> {
    release_type: u32,
    test_type: u32,
    test_desc: &'a str,
    onshelf_self_detect: u8,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTestVersionResponse {
    version_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FileInfo<'a> {
    file_name: &'a str,
    object_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AddTestPackageRequest<'a> {
    distribute_mode: u8,
    file: FileInfo<'a>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddTestPackageResponse {
    #[serde(default)]
    pkg_version: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompileStatusResponse {
    #[serde(default)]
    pkg_state_list: Vec<PackageState>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackageState {
    success_status: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateTestVersionRequest<'a> {
    version_id: &'a str,
    pkg_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    open_test_info: Option<&'a OpenTestInfo>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitTestVersionRequest<'a> {
    version_id: &'a str,
}

#[derive(Deserialize)]
struct GroupListResponse {
    #[serde(default)]
    groups: Vec<TestGroup>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateGroupRequest<'a> {
    group_name: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateGroupResponse {
    group_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateInviteCodeRequest<'a> {
    group_id: &'a str,
    invitation_code_valid_days: u32,
    invitation_code_invite_limit: u32,
}

/// Vendor endpoints for one app
#[derive(Clone)]
pub struct DistributionApi {
    gateway: ApiGateway,
    app_id: String,
}

impl DistributionApi {
    pub fn new(gateway: ApiGateway, app_id: impl Into<String>) -> Self {
        Self {
            gateway,
            app_id: app_id.into(),
        }
    }

    pub fn gateway(&self) -> &ApiGateway {
        &self.gateway
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    fn publishing_call(&self, path: &str) -> ApiCall {
        ApiCall::new(path).query(APP_ID, &self.app_id)
    }

    fn testing_call(&self, path: &str) -> ApiCall {
        ApiCall::new(path).header(APP_ID, self.app_id.clone())
    }

    /// Request a presigned upload target for the artifact
    pub async fn upload_ticket(
        &self,
        file_name: &str,
        content_length: u64,
        sha256: &str,
        release_type: u32,
    ) -> Result<UploadTicket, PublishError> {
        let call = self
            .publishing_call(UPLOAD_URL_PATH)
            .query("fileName", file_name)
            .query("contentLength", content_length)
            .query("sha256", sha256)
            .query("releaseType", release_type);

        let response = self.gateway.get::<RetEnvelope<UploadUrlResponse>>(call).await?;
        debug!(object_id = %response.url_info.object_id, "upload ticket issued");
        Ok(response.url_info)
    }

    /// Create a test version and return its id
    pub async fn create_test_version(
        &self,
        release_type: u32,
        test_type: u32,
        test_desc: &str,
    ) -> Result<String, PublishError> {
        let call = self
            .publishing_call(TEST_VERSION_PATH)
            .json(&CreateTestVersionRequest {
                release_type,
                test_type,
                test_desc,
                onshelf_self_detect: ONSHELF_SELF_DETECT,
            })?;

        let response = self
            .gateway
            .post::<RetEnvelope<CreateTestVersionResponse>>(call)
            .await?;
        Ok(response.version_id)
    }

    /// Register an uploaded object as a test package and return its id
    ///
    /// Only the first reported id is used.
    pub async fn add_package(&self, object_id: &str, file_name: &str) -> Result<String, PublishError> {
        let call = self
            .publishing_call(TEST_PACKAGE_PATH)
            .json(&AddTestPackageRequest {
                distribute_mode: DISTRIBUTE_MODE_TEST,
                file: FileInfo {
                    file_name,
                    object_id,
                },
            })?;

        let response = self
            .gateway
            .post::<RetEnvelope<AddTestPackageResponse>>(call)
            .await?;

        let count = response.pkg_version.len();
        let mut ids = response.pkg_version.into_iter();
        let pkg_id = ids
            .next()
            .ok_or_else(|| PublishError::decode("pkgVersion list is empty", "{\"pkgVersion\":[]}"))?;
        if count > 1 {
            warn!(count, pkg_id = %pkg_id, "multiple packages reported; using the first");
        }
        Ok(pkg_id)
    }

    /// Current compile state of a package
    pub async fn compile_status(&self, pkg_id: &str) -> Result<CompileState, PublishError> {
        let call = self
            .publishing_call(COMPILE_STATUS_PATH)
            .query("pkgIds", pkg_id);

        let response = self
            .gateway
            .get::<RetEnvelope<CompileStatusResponse>>(call)
            .await?;

        Ok(response
            .pkg_state_list
            .first()
            .map(|state| CompileState::from_success_status(state.success_status))
            .unwrap_or(CompileState::Pending))
    }

    /// All tester groups of the app
    pub async fn list_test_groups(&self) -> Result<Vec<TestGroup>, PublishError> {
        let call = self.testing_call(TEST_GROUP_LIST_PATH);

        let response = self
            .gateway
            .get::<RtnCodeEnvelope<GroupListResponse>>(call)
            .await?;
        Ok(response.groups)
    }

    pub async fn create_test_group(&self, group_name: &str) -> Result<String, PublishError> {
        let call = self
            .testing_call(TEST_GROUP_PATH)
            .json(&CreateGroupRequest { group_name })?;

        let response = self
            .gateway
            .post::<RtnCodeEnvelope<CreateGroupResponse>>(call)
            .await?;
        Ok(response.group_id)
    }

    /// Bind the package (and optionally an open test) to a test version
    pub async fn update_test_version(
        &self,
        version_id: &str,
        pkg_id: &str,
        open_test_info: Option<&OpenTestInfo>,
    ) -> Result<(), PublishError> {
        let call = self
            .publishing_call(TEST_VERSION_PATH)
            .json(&UpdateTestVersionRequest {
                version_id,
                pkg_id,
                open_test_info,
            })?;

        self.gateway.put::<RetEnvelope<IgnoredAny>>(call).await?;
        Ok(())
    }

    pub async fn submit_test_version(&self, version_id: &str) -> Result<(), PublishError> {
        let call = self
            .publishing_call(TEST_VERSION_SUBMIT_PATH)
            .json(&SubmitTestVersionRequest { version_id })?;

        self.gateway.post::<RetEnvelope<IgnoredAny>>(call).await?;
        Ok(())
    }

    /// Generate an invitation code for a tester group
    pub async fn create_invite_code(
        &self,
        group_id: &str,
        valid_days: u32,
        invite_limit: u32,
    ) -> Result<InviteCode, PublishError> {
        let call = self
            .testing_call(INVITATION_CODE_PATH)
            .json(&GenerateInviteCodeRequest {
                group_id,
                invitation_code_valid_days: valid_days,
                invitation_code_invite_limit: invite_limit,
            })?;

        self.gateway.post::<RtnCodeEnvelope<InviteCode>>(call).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::http::ReqwestTransport;
    use crate::security::authenticator::Session;
    use secrecy::SecretString;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api(server: &MockServer) -> DistributionApi {
        let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();
        let session = Session::new(SecretString::new("bearer".into()), "client");
        let gateway = ApiGateway::new(Arc::new(transport), &server.uri(), Arc::new(session));
        DistributionApi::new(gateway, "app-1")
    }

    fn ok_ret(payload: serde_json::Value) -> ResponseTemplate {
        let mut body = json!({"ret": {"code": 0, "msg": "success"}});
        if let (Some(target), Some(extra)) = (body.as_object_mut(), payload.as_object()) {
            target.extend(extra.clone());
        }
        ResponseTemplate::new(200).set_body_json(body)
    }

    #[tokio::test]
    async fn test_upload_ticket_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(UPLOAD_URL_PATH))
            .and(query_param("appId", "app-1"))
            .and(query_param("fileName", "app.hap"))
            .and(query_param("contentLength", "42"))
            .and(query_param("sha256", "abc"))
            .and(query_param("releaseType", "6"))
            .respond_with(ok_ret(json!({"urlInfo": {
                "url": "https://obs.example.com/o/1",
                "method": "PUT",
                "headers": {"x-amz-acl": "private"},
                "objectId": "obj-1"
            }})))
            .expect(1)
            .mount(&server)
            .await;

        let ticket = api(&server).upload_ticket("app.hap", 42, "abc", 6).await.unwrap();
        assert_eq!(ticket.object_id, "obj-1");
        assert_eq!(ticket.method, "PUT");
        assert_eq!(ticket.headers.get("x-amz-acl").map(String::as_str), Some("private"));
    }

    #[tokio::test]
    async fn test_create_test_version_body_and_app_query() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TEST_VERSION_PATH))
            .and(query_param("appId", "app-1"))
            .and(body_json(json!({
                "releaseType": 6,
                "testType": 3,
                "testDesc": "check login",
                "onshelfSelfDetect": 0
            })))
            .respond_with(ok_ret(json!({"versionId": "V1"})))
            .expect(1)
            .mount(&server)
            .await;

        let version = api(&server).create_test_version(6, 3, "check login").await.unwrap();
        assert_eq!(version, "V1");
    }

    #[tokio::test]
    async fn test_add_package_uses_first_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TEST_PACKAGE_PATH))
            .and(query_param("appId", "app-1"))
            .and(body_json(json!({
                "distributeMode": 2,
                "file": {"fileName": "app.hap", "objectId": "obj-1"}
            })))
            .respond_with(ok_ret(json!({"pkgVersion": ["P1", "P2"]})))
            .expect(1)
            .mount(&server)
            .await;

        assert_eq!(api(&server).add_package("obj-1", "app.hap").await.unwrap(), "P1");
    }

    #[tokio::test]
    async fn test_add_package_empty_list_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TEST_PACKAGE_PATH))
            .respond_with(ok_ret(json!({"pkgVersion": []})))
            .mount(&server)
            .await;

        assert!(matches!(
            api(&server).add_package("obj-1", "app.hap").await,
            Err(PublishError::Decode { .. })
        ));
    }

    #[tokio::test]
    async fn test_compile_status_states() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(COMPILE_STATUS_PATH))
            .and(query_param("appId", "app-1"))
            .and(query_param("pkgIds", "P-ok"))
            .respond_with(ok_ret(json!({"pkgStateList": [{"pkgId": "P-ok", "successStatus": 0}]})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(COMPILE_STATUS_PATH))
            .and(query_param("pkgIds", "P-wait"))
            .respond_with(ok_ret(json!({"pkgStateList": [{"pkgId": "P-wait", "successStatus": 2}]})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(COMPILE_STATUS_PATH))
            .and(query_param("pkgIds", "P-none"))
            .respond_with(ok_ret(json!({"pkgStateList": []})))
            .mount(&server)
            .await;

        let api = api(&server);
        assert_eq!(api.compile_status("P-ok").await.unwrap(), CompileState::Succeeded);
        assert_eq!(api.compile_status("P-wait").await.unwrap(), CompileState::Pending);
        assert_eq!(api.compile_status("P-none").await.unwrap(), CompileState::Pending);
    }

    #[tokio::test]
    async fn test_group_endpoints_use_rtn_code_and_app_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(TEST_GROUP_LIST_PATH))
            .and(header("appId", "app-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "rtnCode": 0,
                "groups": [{"groupId": "G1", "groupName": "beta", "addedTestersNum": 4}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(TEST_GROUP_PATH))
            .and(header("appId", "app-1"))
            .and(body_json(json!({"groupName": "gamma"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"rtnCode": 3})))
            .expect(1)
            .mount(&server)
            .await;

        let api = api(&server);
        let groups = api.list_test_groups().await.unwrap();
        assert_eq!(
            groups,
            vec![TestGroup {
                group_id: "G1".to_string(),
                group_name: "beta".to_string(),
                added_testers_num: Some(4),
            }]
        );
        assert!(matches!(
            api.create_test_group("gamma").await,
            Err(PublishError::RtnCode { code: 3 })
        ));
    }

    #[tokio::test]
    async fn test_update_version_with_open_test_info() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(TEST_VERSION_PATH))
            .and(query_param("appId", "app-1"))
            .and(body_json(json!({
                "versionId": "V1",
                "pkgId": "P1",
                "openTestInfo": {
                    "startTime": 1000,
                    "endTime": 2000,
                    "testTaskInfo": {
                        "groupInfos": [{"groupId": "G1"}],
                        "displayArea": "1"
                    }
                }
            })))
            .respond_with(ok_ret(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let info = OpenTestInfo::for_group("G1", 1000, 2000);
        api(&server)
            .update_test_version("V1", "P1", Some(&info))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_version_without_group_omits_open_test_info() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(TEST_VERSION_PATH))
            .and(body_json(json!({"versionId": "V1", "pkgId": "P1"})))
            .respond_with(ok_ret(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        api(&server).update_test_version("V1", "P1", None).await.unwrap();
    }

    #[tokio::test]
    async fn test_submit_sends_version_id_with_app_query() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TEST_VERSION_SUBMIT_PATH))
            .and(query_param("appId", "app-1"))
            .and(body_json(json!({"versionId": "V1"})))
            .respond_with(ok_ret(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        api(&server).submit_test_version("V1").await.unwrap();
    }

    #[tokio::test]
    async fn test_invite_code_sends_day_count_and_reads_invitation_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(INVITATION_CODE_PATH))
            .and(header("appId", "app-1"))
            .and(body_json(json!({
                "groupId": "G1",
                "invitationCodeValidDays": 7,
                "invitationCodeInviteLimit": 1000
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "rtnCode": 0,
                "invitationCode": "ABCD",
                "invitationCodeId": "C1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let code = api(&server).create_invite_code("G1", 7, 1000).await.unwrap();
        assert_eq!(
            code,
            InviteCode {
                invitation_code: "ABCD".to_string(),
                invitation_code_id: "C1".to_string()
            }
        );
    }
}
