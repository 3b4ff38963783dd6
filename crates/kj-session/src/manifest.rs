//! Embedded jump pod manifest

/// Pod manifest template. `generateName:` makes the cluster assign a fresh
/// suffix per session, so the creation output carries the qualified name.
const POD_TEMPLATE: &str = r#"apiVersion: v1
kind: Pod
metadata:
  generateName: jumper-
  namespace: {namespace}
  labels:
    app: kjump
spec:
  containers:
    - name: jumper
      image: {image}
      ports:
        - containerPort: 22
          name: ssh
"#;

/// Render the jump pod manifest for the given namespace and image.
pub fn render(namespace: &str, image: &str) -> String {
    POD_TEMPLATE
        .replace("{namespace}", namespace)
        .replace("{image}", image)
}
