//! Android implementations of the discovery and direct-path seams.
//!
//! Signer apps answer in-process requests through a content provider at
//! `content://<package>.<METHOD>` and are discovered by resolving the
//! `nostrsigner:` scheme. Both go through JNI.
//!
//! See: https://github.com/nostr-protocol/nips/blob/master/55.md

use std::sync::Arc;

use jni::{
    JNIEnv, JavaVM,
    objects::{GlobalRef, JByteArray, JObject, JString, JValue},
};

use super::collaborators::{SignerDiscovery, SignerProvider};
use crate::error::SignerError;
use crate::types::{NOSTRSIGNER_SCHEME, OperationKind, Permission, SignedEvent, SignerAppInfo};

/// Columns a signer's content provider may return.
#[derive(Debug, Default)]
struct QueryRow {
    result: Option<String>,
    event: Option<String>,
    rejected: bool,
}

/// Edge length used when a launcher icon reports no intrinsic size.
const FALLBACK_ICON_SIZE: i32 = 96;

fn jni_error(context: &str, e: impl std::fmt::Display) -> SignerError {
    SignerError::Platform(format!("{context}: {e}"))
}

/// Process-wide JNI handles needed by the Android seams.
pub struct AndroidSignerContext {
    vm: JavaVM,
    content_resolver: GlobalRef,
    package_manager: GlobalRef,
}

// JavaVM is thread-safe and GlobalRef is valid on any attached thread.
unsafe impl Send for AndroidSignerContext {}
unsafe impl Sync for AndroidSignerContext {}

impl std::fmt::Debug for AndroidSignerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AndroidSignerContext")
            .field("vm", &"<JavaVM>")
            .field("content_resolver", &"<GlobalRef>")
            .field("package_manager", &"<GlobalRef>")
            .finish()
    }
}

impl AndroidSignerContext {
    /// Captures the JVM and global references to the app's `ContentResolver`
    /// and `PackageManager`.
    pub fn new(
        env: &mut JNIEnv,
        content_resolver: &JObject,
        package_manager: &JObject,
    ) -> Result<Self, SignerError> {
        let vm = env
            .get_java_vm()
            .map_err(|e| jni_error("Failed to get JavaVM", e))?;
        let content_resolver = env
            .new_global_ref(content_resolver)
            .map_err(|e| jni_error("Failed to create global ref", e))?;
        let package_manager = env
            .new_global_ref(package_manager)
            .map_err(|e| jni_error("Failed to create global ref", e))?;

        Ok(Self {
            vm,
            content_resolver,
            package_manager,
        })
    }

    /// Queries `content://<package>.<method>` with `projection`.
    ///
    /// A null cursor means the signer does not serve this call in-process.
    fn query(
        &self,
        package_name: &str,
        method: &str,
        projection: &[&str],
    ) -> Result<Option<QueryRow>, SignerError> {
        let mut env = self
            .vm
            .attach_current_thread()
            .map_err(|e| jni_error("Failed to attach thread", e))?;

        let uri = parse_uri(&mut env, &format!("content://{package_name}.{method}"))?;
        let projection = string_array(&mut env, projection)?;

        let cursor = env
            .call_method(
                &self.content_resolver,
                "query",
                "(Landroid/net/Uri;[Ljava/lang/String;Ljava/lang/String;[Ljava/lang/String;Ljava/lang/String;)Landroid/database/Cursor;",
                &[
                    JValue::Object(&uri),
                    JValue::Object(&projection),
                    JValue::Object(&JObject::null()),
                    JValue::Object(&JObject::null()),
                    JValue::Object(&JObject::null()),
                ],
            )
            .and_then(|value| value.l());

        // A provider that is missing or not exported throws; treat it like a null cursor.
        let cursor = match cursor {
            Ok(cursor) => cursor,
            Err(e) => {
                let _ = env.exception_clear();
                tracing::debug!(target: "nip55_bridge::android", "Content provider query failed: {}", e);
                return Ok(None);
            }
        };
        if cursor.is_null() {
            return Ok(None);
        }

        let row = read_first_row(&mut env, &cursor);
        let _ = env.call_method(&cursor, "close", "()V", &[]);
        row
    }

    fn installed_signers(&self) -> Result<Vec<SignerAppInfo>, SignerError> {
        let mut env = self
            .vm
            .attach_current_thread()
            .map_err(|e| jni_error("Failed to attach thread", e))?;

        let uri = parse_uri(&mut env, NOSTRSIGNER_SCHEME)?;
        let action = env
            .new_string("android.intent.action.VIEW")
            .map_err(|e| jni_error("Failed to create string", e))?;
        let intent = env
            .new_object(
                "android/content/Intent",
                "(Ljava/lang/String;Landroid/net/Uri;)V",
                &[JValue::Object(&action), JValue::Object(&uri)],
            )
            .map_err(|e| jni_error("Failed to create Intent", e))?;

        let list = env
            .call_method(
                &self.package_manager,
                "queryIntentActivities",
                "(Landroid/content/Intent;I)Ljava/util/List;",
                &[JValue::Object(&intent), JValue::Int(0)],
            )
            .and_then(|value| value.l())
            .map_err(|e| jni_error("Failed to query intent activities", e))?;

        let size = env
            .call_method(&list, "size", "()I", &[])
            .and_then(|value| value.i())
            .map_err(|e| jni_error("Failed to read list size", e))?;

        let mut apps: Vec<SignerAppInfo> = Vec::new();
        for index in 0..size {
            let resolve_info = env
                .call_method(&list, "get", "(I)Ljava/lang/Object;", &[JValue::Int(index)])
                .and_then(|value| value.l())
                .map_err(|e| jni_error("Failed to read list element", e))?;
            let activity_info = env
                .get_field(
                    &resolve_info,
                    "activityInfo",
                    "Landroid/content/pm/ActivityInfo;",
                )
                .and_then(|value| value.l())
                .map_err(|e| jni_error("Failed to read activityInfo", e))?;
            let package_name = env
                .get_field(&activity_info, "packageName", "Ljava/lang/String;")
                .and_then(|value| value.l())
                .map_err(|e| jni_error("Failed to read packageName", e))?;
            let Some(package_name) = java_string(&mut env, package_name)? else {
                continue;
            };

            let label = env
                .call_method(
                    &resolve_info,
                    "loadLabel",
                    "(Landroid/content/pm/PackageManager;)Ljava/lang/CharSequence;",
                    &[JValue::Object(self.package_manager.as_obj())],
                )
                .and_then(|value| value.l())
                .and_then(|label| env.call_method(&label, "toString", "()Ljava/lang/String;", &[]))
                .and_then(|value| value.l())
                .map_err(|e| jni_error("Failed to load label", e))?;
            let name = java_string(&mut env, label)?.unwrap_or_else(|| package_name.clone());

            if apps.iter().any(|app| app.package_name == package_name) {
                continue;
            }

            let app = SignerAppInfo::new(name, package_name);
            // A broken icon never hides the signer itself.
            let app = match load_icon_png(&mut env, &resolve_info, self.package_manager.as_obj()) {
                Ok(png) => app.with_icon_png(&png),
                Err(e) => {
                    let _ = env.exception_clear();
                    tracing::debug!(
                        target: "nip55_bridge::android",
                        "Failed to load icon for {}: {}",
                        app.package_name,
                        e
                    );
                    app
                }
            };
            apps.push(app);
        }

        Ok(apps)
    }
}

/// Renders the activity's launcher icon into PNG bytes.
fn load_icon_png(
    env: &mut JNIEnv,
    resolve_info: &JObject,
    package_manager: &JObject,
) -> jni::errors::Result<Vec<u8>> {
    env.with_local_frame(16, |env| {
        let drawable = env
            .call_method(
                resolve_info,
                "loadIcon",
                "(Landroid/content/pm/PackageManager;)Landroid/graphics/drawable/Drawable;",
                &[JValue::Object(package_manager)],
            )?
            .l()?;

        let width = env
            .call_method(&drawable, "getIntrinsicWidth", "()I", &[])?
            .i()?;
        let height = env
            .call_method(&drawable, "getIntrinsicHeight", "()I", &[])?
            .i()?;
        let (width, height) = if width > 0 && height > 0 {
            (width, height)
        } else {
            (FALLBACK_ICON_SIZE, FALLBACK_ICON_SIZE)
        };

        let config = env
            .get_static_field(
                "android/graphics/Bitmap$Config",
                "ARGB_8888",
                "Landroid/graphics/Bitmap$Config;",
            )?
            .l()?;
        let bitmap = env
            .call_static_method(
                "android/graphics/Bitmap",
                "createBitmap",
                "(IILandroid/graphics/Bitmap$Config;)Landroid/graphics/Bitmap;",
                &[JValue::Int(width), JValue::Int(height), JValue::Object(&config)],
            )?
            .l()?;
        let canvas = env.new_object(
            "android/graphics/Canvas",
            "(Landroid/graphics/Bitmap;)V",
            &[JValue::Object(&bitmap)],
        )?;

        env.call_method(
            &drawable,
            "setBounds",
            "(IIII)V",
            &[
                JValue::Int(0),
                JValue::Int(0),
                JValue::Int(width),
                JValue::Int(height),
            ],
        )?;
        env.call_method(
            &drawable,
            "draw",
            "(Landroid/graphics/Canvas;)V",
            &[JValue::Object(&canvas)],
        )?;

        let format = env
            .get_static_field(
                "android/graphics/Bitmap$CompressFormat",
                "PNG",
                "Landroid/graphics/Bitmap$CompressFormat;",
            )?
            .l()?;
        let stream = env.new_object("java/io/ByteArrayOutputStream", "()V", &[])?;
        env.call_method(
            &bitmap,
            "compress",
            "(Landroid/graphics/Bitmap$CompressFormat;ILjava/io/OutputStream;)Z",
            &[
                JValue::Object(&format),
                JValue::Int(100),
                JValue::Object(&stream),
            ],
        )?;

        let bytes = JByteArray::from(env.call_method(&stream, "toByteArray", "()[B", &[])?.l()?);
        env.convert_byte_array(&bytes)
    })
}

fn parse_uri<'a>(env: &mut JNIEnv<'a>, uri_string: &str) -> Result<JObject<'a>, SignerError> {
    let uri_str = env
        .new_string(uri_string)
        .map_err(|e| jni_error("Failed to create string", e))?;

    env.call_static_method(
        "android/net/Uri",
        "parse",
        "(Ljava/lang/String;)Landroid/net/Uri;",
        &[JValue::Object(&uri_str)],
    )
    .and_then(|value| value.l())
    .map_err(|e| jni_error("Failed to call Uri.parse", e))
}

fn string_array<'a>(env: &mut JNIEnv<'a>, values: &[&str]) -> Result<JObject<'a>, SignerError> {
    let array = env
        .new_object_array(values.len() as i32, "java/lang/String", JObject::null())
        .map_err(|e| jni_error("Failed to create array", e))?;

    for (i, value) in values.iter().enumerate() {
        let jvalue = env
            .new_string(value)
            .map_err(|e| jni_error("Failed to create projection string", e))?;
        env.set_object_array_element(&array, i as i32, jvalue)
            .map_err(|e| jni_error("Failed to set array element", e))?;
    }

    Ok(array.into())
}

fn read_first_row(env: &mut JNIEnv, cursor: &JObject) -> Result<Option<QueryRow>, SignerError> {
    let has_row = env
        .call_method(cursor, "moveToFirst", "()Z", &[])
        .and_then(|value| value.z())
        .map_err(|e| jni_error("Failed to moveToFirst", e))?;
    if !has_row {
        return Ok(None);
    }

    let rejected = match column_string(env, cursor, "rejected")? {
        Some(value) => value != "false",
        None => false,
    };

    Ok(Some(QueryRow {
        result: column_string(env, cursor, "result")?,
        event: column_string(env, cursor, "event")?,
        rejected,
    }))
}

fn column_string(
    env: &mut JNIEnv,
    cursor: &JObject,
    column_name: &str,
) -> Result<Option<String>, SignerError> {
    let column = env
        .new_string(column_name)
        .map_err(|e| jni_error("Failed to create column name", e))?;
    let index = env
        .call_method(
            cursor,
            "getColumnIndex",
            "(Ljava/lang/String;)I",
            &[JValue::Object(&column)],
        )
        .and_then(|value| value.i())
        .map_err(|e| jni_error("Failed to getColumnIndex", e))?;
    if index < 0 {
        return Ok(None);
    }

    let value = env
        .call_method(cursor, "getString", "(I)Ljava/lang/String;", &[JValue::Int(index)])
        .and_then(|value| value.l())
        .map_err(|e| jni_error("Failed to getString", e))?;
    java_string(env, value)
}

fn java_string(env: &mut JNIEnv, object: JObject) -> Result<Option<String>, SignerError> {
    if object.is_null() {
        return Ok(None);
    }
    let jstring: JString = object.into();
    let value = env
        .get_string(&jstring)
        .map_err(|e| jni_error("Failed to convert string", e))?;
    Ok(Some(value.into()))
}

/// Lists apps that handle the `nostrsigner:` scheme.
#[derive(Debug, Clone)]
pub struct PackageManagerDiscovery {
    context: Arc<AndroidSignerContext>,
}

impl PackageManagerDiscovery {
    pub fn new(context: Arc<AndroidSignerContext>) -> Self {
        Self { context }
    }
}

impl SignerDiscovery for PackageManagerDiscovery {
    fn installed_signers(&self) -> Vec<SignerAppInfo> {
        match self.context.installed_signers() {
            Ok(apps) => apps,
            Err(e) => {
                tracing::warn!(
                    target: "nip55_bridge::android",
                    "Failed to list signer apps: {}",
                    e
                );
                Vec::new()
            }
        }
    }
}

/// Direct path through the signer's content provider.
#[derive(Debug, Clone)]
pub struct ContentResolverProvider {
    context: Arc<AndroidSignerContext>,
}

impl ContentResolverProvider {
    pub fn new(context: Arc<AndroidSignerContext>) -> Self {
        Self { context }
    }

    fn query(
        &self,
        package_name: &str,
        kind: OperationKind,
        projection: &[&str],
    ) -> Result<Option<QueryRow>, SignerError> {
        let row = self
            .context
            .query(package_name, kind.content_method(), projection)?;
        match row {
            Some(row) if row.rejected => Err(SignerError::Rejected),
            row => Ok(row),
        }
    }

    fn query_result(
        &self,
        package_name: &str,
        kind: OperationKind,
        projection: &[&str],
    ) -> Result<Option<String>, SignerError> {
        Ok(self
            .query(package_name, kind, projection)?
            .and_then(|row| row.result))
    }
}

impl SignerProvider for ContentResolverProvider {
    fn get_public_key(
        &self,
        package_name: &str,
        _permissions: &[Permission],
    ) -> Result<Option<String>, SignerError> {
        self.query_result(package_name, OperationKind::GetPublicKey, &["login"])
    }

    fn sign_event(
        &self,
        package_name: &str,
        event_json: &str,
        current_user: &str,
    ) -> Result<Option<SignedEvent>, SignerError> {
        let Some(row) = self.query(
            package_name,
            OperationKind::SignEvent,
            &[event_json, "", current_user],
        )?
        else {
            return Ok(None);
        };
        let Some(signature) = row.result else {
            return Ok(None);
        };
        let event = row.event.ok_or_else(|| {
            SignerError::InvalidResponse("No signed event returned from signer".to_string())
        })?;
        Ok(Some(SignedEvent { signature, event }))
    }

    fn nip04_encrypt(
        &self,
        package_name: &str,
        plain_text: &str,
        pubkey: &str,
        current_user: &str,
    ) -> Result<Option<String>, SignerError> {
        self.query_result(
            package_name,
            OperationKind::Nip04Encrypt,
            &[plain_text, pubkey, current_user],
        )
    }

    fn nip04_decrypt(
        &self,
        package_name: &str,
        cipher_text: &str,
        pubkey: &str,
        current_user: &str,
    ) -> Result<Option<String>, SignerError> {
        self.query_result(
            package_name,
            OperationKind::Nip04Decrypt,
            &[cipher_text, pubkey, current_user],
        )
    }

    fn nip44_encrypt(
        &self,
        package_name: &str,
        plain_text: &str,
        pubkey: &str,
        current_user: &str,
    ) -> Result<Option<String>, SignerError> {
        self.query_result(
            package_name,
            OperationKind::Nip44Encrypt,
            &[plain_text, pubkey, current_user],
        )
    }

    fn nip44_decrypt(
        &self,
        package_name: &str,
        cipher_text: &str,
        pubkey: &str,
        current_user: &str,
    ) -> Result<Option<String>, SignerError> {
        self.query_result(
            package_name,
            OperationKind::Nip44Decrypt,
            &[cipher_text, pubkey, current_user],
        )
    }

    fn decrypt_zap_event(
        &self,
        package_name: &str,
        event_json: &str,
        current_user: &str,
    ) -> Result<Option<String>, SignerError> {
        self.query_result(
            package_name,
            OperationKind::DecryptZapEvent,
            &[event_json, "", current_user],
        )
    }

    fn get_relays(
        &self,
        package_name: &str,
        current_user: &str,
    ) -> Result<Option<String>, SignerError> {
        self.query_result(
            package_name,
            OperationKind::GetRelays,
            &["", "", current_user],
        )
    }
}
