//! Attribute and type inspection for the `Stackable` derive.

use proc_macro2::Span;
use syn::visit::Visit;
use syn::{
    Attribute, Data, DeriveInput, Fields, GenericArgument, Ident, LitStr, Member, PathArguments,
    Type, Visibility,
};

/// Container-level `#[stack(...)]` options.
#[derive(Default)]
pub(crate) struct ContainerAttrs {
    /// Replace whole instead of overlaying field by field.
    pub atomic: bool,
    /// Route `Schema::verify` to the type's `Verify` impl.
    pub verify: bool,
    /// Name of the generated shadow struct.
    pub shadow: Option<Ident>,
    /// Extra derives for the shadow struct.
    pub derives: Vec<syn::Path>,
    /// Path to the runtime crate, for renamed dependencies.
    pub crate_path: Option<syn::Path>,
}

/// Field-level `#[stack(...)]` options.
#[derive(Default, Clone, Copy)]
pub(crate) struct FieldAttrs {
    /// Leave the field out of the shadow.
    pub skip: bool,
    /// Copy with `Clone` instead of deep-copying, and leave out of the shadow.
    pub by_ref: bool,
}

/// How a field takes part in the generated impls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldRole {
    /// Present in the shadow, overlaid and deep-copied.
    Shadowed,
    /// Deep-copied only: private or skipped.
    Copied,
    /// Cloned only: functions, handles and channels.
    ByRef,
}

/// A parsed field.
pub(crate) struct FieldSpec {
    pub member: Member,
    pub name: String,
    pub vis: Visibility,
    pub ty: Type,
    pub docs: Vec<Attribute>,
    pub role: FieldRole,
}

/// A parsed enum variant.
pub(crate) struct VariantSpec {
    pub ident: Ident,
    pub style: Style,
    pub fields: Vec<FieldSpec>,
}

/// Field syntax of a struct or variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Style {
    Named,
    Tuple,
    Unit,
}

/// The shape of the deriving type.
pub(crate) enum Body {
    Struct { style: Style, fields: Vec<FieldSpec> },
    Enum(Vec<VariantSpec>),
}

/// Everything the expansion needs from the input.
pub(crate) struct Input {
    pub ident: Ident,
    pub vis: Visibility,
    pub generics: syn::Generics,
    pub docs: Vec<Attribute>,
    pub attrs: ContainerAttrs,
    pub body: Body,
}

impl Input {
    /// Whether the type is replaced whole rather than overlaid.
    pub(crate) fn is_atomic(&self) -> bool {
        self.attrs.atomic || matches!(self.body, Body::Enum(_))
    }
}

/// Iterate all `#[stack(...)]` attributes and apply a callback.
fn parse_stack<F>(attrs: &[Attribute], mut f: F) -> syn::Result<()>
where
    F: FnMut(&syn::meta::ParseNestedMeta) -> syn::Result<()>,
{
    for attr in attrs.iter().filter(|a| a.path().is_ident("stack")) {
        attr.parse_nested_meta(|meta| f(&meta))?;
    }
    Ok(())
}

pub(crate) fn parse_container_attrs(attrs: &[Attribute]) -> syn::Result<ContainerAttrs> {
    let mut out = ContainerAttrs::default();
    parse_stack(attrs, |meta| {
        if meta.path.is_ident("atomic") {
            out.atomic = true;
        } else if meta.path.is_ident("verify") {
            out.verify = true;
        } else if meta.path.is_ident("shadow") {
            let name = meta.value()?.parse::<LitStr>()?;
            out.shadow = Some(name.parse()?);
        } else if meta.path.is_ident("derive") {
            meta.parse_nested_meta(|nested| {
                out.derives.push(nested.path.clone());
                Ok(())
            })?;
        } else if meta.path.is_ident("crate") {
            let path = meta.value()?.parse::<LitStr>()?;
            out.crate_path = Some(path.parse()?);
        } else {
            return Err(meta.error("unknown `stack` container attribute"));
        }
        Ok(())
    })?;
    Ok(out)
}

pub(crate) fn parse_field_attrs(attrs: &[Attribute]) -> syn::Result<FieldAttrs> {
    let mut out = FieldAttrs::default();
    parse_stack(attrs, |meta| {
        if meta.path.is_ident("skip") {
            out.skip = true;
        } else if meta.path.is_ident("by_ref") {
            out.by_ref = true;
        } else {
            return Err(meta.error("unknown `stack` field attribute"));
        }
        Ok(())
    })?;
    Ok(out)
}

fn docs(attrs: &[Attribute]) -> Vec<Attribute> {
    attrs
        .iter()
        .filter(|a| a.path().is_ident("doc"))
        .cloned()
        .collect()
}

fn first_type_arg(args: &PathArguments) -> Option<&Type> {
    let PathArguments::AngleBracketed(args) = args else {
        return None;
    };
    args.args.iter().find_map(|arg| match arg {
        GenericArgument::Type(inner) => Some(inner),
        _ => None,
    })
}

/// Whether values of `ty` can only be copied by reference.
///
/// Matches on the final path segment so qualified forms such as
/// `tokio::sync::mpsc::Sender<T>` are recognised.
pub(crate) fn is_by_ref_type(ty: &Type) -> bool {
    match ty {
        Type::BareFn(_) => true,
        Type::Paren(inner) => is_by_ref_type(&inner.elem),
        Type::Group(inner) => is_by_ref_type(&inner.elem),
        Type::Path(p) if p.qself.is_none() => {
            let Some(last) = p.path.segments.last() else {
                return false;
            };
            match last.ident.to_string().as_str() {
                "Handle" | "Sender" | "SyncSender" | "UnboundedSender" | "PhantomData" => true,
                "Arc" => first_type_arg(&last.arguments)
                    .is_some_and(|inner| matches!(inner, Type::TraitObject(_)) || is_by_ref_type(inner)),
                "Option" => first_type_arg(&last.arguments).is_some_and(is_by_ref_type),
                _ => false,
            }
        }
        _ => false,
    }
}

/// Human-readable rendering of a type for field metadata.
pub(crate) fn type_label(ty: &Type) -> String {
    quote::quote!(#ty)
        .to_string()
        .replace(" :: ", "::")
        .replace(":: ", "::")
        .replace(" <", "<")
        .replace("< ", "<")
        .replace(" >", ">")
        .replace(" ,", ",")
        .replace(" ;", ";")
        .replace("& ", "&")
}

fn field_specs(fields: &Fields) -> syn::Result<Vec<FieldSpec>> {
    fields
        .iter()
        .enumerate()
        .map(|(index, field)| {
            let attrs = parse_field_attrs(&field.attrs)?;
            let (member, name) = match &field.ident {
                Some(ident) => (Member::Named(ident.clone()), ident.to_string()),
                None => (Member::Unnamed(index.into()), index.to_string()),
            };
            let private = matches!(field.vis, Visibility::Inherited);
            let role = if attrs.by_ref || is_by_ref_type(&field.ty) {
                FieldRole::ByRef
            } else if attrs.skip || private {
                FieldRole::Copied
            } else {
                FieldRole::Shadowed
            };
            Ok(FieldSpec {
                member,
                name: name.trim_start_matches("r#").to_string(),
                vis: field.vis.clone(),
                ty: field.ty.clone(),
                docs: docs(&field.attrs),
                role,
            })
        })
        .collect()
}

fn style_of(fields: &Fields) -> Style {
    match fields {
        Fields::Named(_) => Style::Named,
        Fields::Unnamed(_) => Style::Tuple,
        Fields::Unit => Style::Unit,
    }
}

/// Gather and validate everything the derive needs in one pass.
pub(crate) fn parse_input(input: &DeriveInput) -> syn::Result<Input> {
    if let Some(lifetime) = input.generics.lifetimes().next() {
        return Err(syn::Error::new_spanned(
            lifetime,
            "Stackable types must own their data and cannot have lifetime parameters",
        ));
    }

    let attrs = parse_container_attrs(&input.attrs)?;
    let body = match &input.data {
        Data::Struct(data) => Body::Struct {
            style: style_of(&data.fields),
            fields: field_specs(&data.fields)?,
        },
        Data::Enum(data) => Body::Enum(
            data.variants
                .iter()
                .map(|variant| {
                    Ok(VariantSpec {
                        ident: variant.ident.clone(),
                        style: style_of(&variant.fields),
                        fields: field_specs(&variant.fields)?,
                    })
                })
                .collect::<syn::Result<_>>()?,
        ),
        Data::Union(data) => {
            return Err(syn::Error::new_spanned(
                data.union_token,
                "Stackable cannot be derived for unions",
            ));
        }
    };

    let parsed = Input {
        ident: input.ident.clone(),
        vis: input.vis.clone(),
        generics: input.generics.clone(),
        docs: docs(&input.attrs),
        attrs,
        body,
    };
    if parsed.attrs.verify && parsed.is_atomic() {
        return Err(syn::Error::new(
            Span::call_site(),
            "`verify` applies to structs overlaid field by field; atomic types are never verified",
        ));
    }
    if parsed.is_atomic() && (parsed.attrs.shadow.is_some() || !parsed.attrs.derives.is_empty()) {
        return Err(syn::Error::new(
            Span::call_site(),
            "atomic types have no shadow struct; remove `shadow` and `derive`",
        ));
    }
    Ok(parsed)
}

/// Collects the type parameters a set of types mentions.
struct TypeParamUse<'a> {
    params: &'a [Ident],
    used: Vec<bool>,
}

impl<'ast> Visit<'ast> for TypeParamUse<'_> {
    fn visit_path(&mut self, path: &'ast syn::Path) {
        if let Some(ident) = path.get_ident() {
            if let Some(pos) = self.params.iter().position(|p| p == ident) {
                self.used[pos] = true;
            }
        }
        syn::visit::visit_path(self, path);
    }
}

/// The type parameters in `params` that none of `types` mention.
pub(crate) fn unused_params<'a, 't>(
    params: &'a [Ident],
    types: impl IntoIterator<Item = &'t Type>,
) -> Vec<&'a Ident> {
    let mut visitor = TypeParamUse {
        params,
        used: vec![false; params.len()],
    };
    for ty in types {
        visitor.visit_type(ty);
    }
    params
        .iter()
        .zip(visitor.used)
        .filter_map(|(param, used)| (!used).then_some(param))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use syn::parse_quote;

    #[rstest]
    #[case(parse_quote!(fn(u32) -> u32), true)]
    #[case(parse_quote!(Handle<dyn Fn() + Send + Sync>), true)]
    #[case(parse_quote!(tokio::sync::mpsc::Sender<Event>), true)]
    #[case(parse_quote!(std::sync::mpsc::SyncSender<u8>), true)]
    #[case(parse_quote!(Option<UnboundedSender<u8>>), true)]
    #[case(parse_quote!(Arc<dyn Fn(u8) + Send + Sync>), true)]
    #[case(parse_quote!(PhantomData<T>), true)]
    #[case(parse_quote!(Arc<Inner>), false)]
    #[case(parse_quote!(Option<u32>), false)]
    #[case(parse_quote!(Vec<Sender<u8>>), false)]
    #[case(parse_quote!(String), false)]
    fn detects_by_ref_types(#[case] ty: Type, #[case] expected: bool) {
        assert_eq!(is_by_ref_type(&ty), expected);
    }

    #[rstest]
    #[case(parse_quote!(Vec<String>), "Vec<String>")]
    #[case(parse_quote!(HashMap<String, u32>), "HashMap<String, u32>")]
    #[case(parse_quote!(Option<Box<Inner>>), "Option<Box<Inner>>")]
    #[case(parse_quote!(std::path::PathBuf), "std::path::PathBuf")]
    #[case(parse_quote!([u8; 4]), "[u8; 4]")]
    #[case(parse_quote!(&'static str), "&'static str")]
    fn renders_type_labels(#[case] ty: Type, #[case] expected: &str) {
        assert_eq!(type_label(&ty), expected);
    }

    #[test]
    fn parses_container_attrs() {
        let attrs: Vec<Attribute> = vec![
            parse_quote!(#[stack(verify, shadow = "Partial")]),
            parse_quote!(#[stack(derive(Clone, serde::Deserialize), crate = "renamed")]),
        ];
        let parsed = parse_container_attrs(&attrs).expect("valid attrs");
        assert!(parsed.verify);
        assert!(!parsed.atomic);
        assert_eq!(parsed.shadow.expect("shadow").to_string(), "Partial");
        assert_eq!(parsed.derives.len(), 2);
        let krate = parsed.crate_path.expect("crate path");
        assert!(krate.is_ident("renamed"));
    }

    #[test]
    fn rejects_unknown_attrs() {
        let attrs: Vec<Attribute> = vec![parse_quote!(#[stack(atmoic)])];
        assert!(parse_container_attrs(&attrs).is_err());

        let attrs: Vec<Attribute> = vec![parse_quote!(#[stack(skipp)])];
        assert!(parse_field_attrs(&attrs).is_err());
    }

    #[test]
    fn classifies_fields() {
        let input: DeriveInput = parse_quote! {
            pub struct Config {
                pub port: u16,
                secret: String,
                #[stack(skip)]
                pub cache: Vec<u8>,
                pub hook: fn(),
                #[stack(by_ref)]
                pub client: Client,
            }
        };
        let parsed = parse_input(&input).expect("valid input");
        let Body::Struct { style, fields } = parsed.body else {
            panic!("expected struct");
        };
        assert_eq!(style, Style::Named);
        let roles: Vec<_> = fields.iter().map(|f| f.role).collect();
        assert_eq!(
            roles,
            [
                FieldRole::Shadowed,
                FieldRole::Copied,
                FieldRole::Copied,
                FieldRole::ByRef,
                FieldRole::ByRef,
            ]
        );
    }

    #[test]
    fn tuple_fields_are_numbered() {
        let input: DeriveInput = parse_quote! {
            pub struct Pair(pub u8, u8, pub String);
        };
        let parsed = parse_input(&input).expect("valid input");
        let Body::Struct { style, fields } = parsed.body else {
            panic!("expected struct");
        };
        assert_eq!(style, Style::Tuple);
        let names: Vec<_> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["0", "1", "2"]);
    }

    #[test]
    fn rejects_unions_and_lifetimes() {
        let union: DeriveInput = parse_quote! {
            union Bits { a: u32, b: f32 }
        };
        assert!(parse_input(&union).is_err());

        let borrowed: DeriveInput = parse_quote! {
            struct View<'a> { pub name: &'a str }
        };
        assert!(parse_input(&borrowed).is_err());
    }

    #[test]
    fn enums_are_atomic_and_cannot_verify() {
        let input: DeriveInput = parse_quote! {
            enum Mode { Fast, Slow { factor: u8 } }
        };
        assert!(parse_input(&input).expect("valid").is_atomic());

        let input: DeriveInput = parse_quote! {
            #[stack(verify)]
            enum Mode { Fast }
        };
        assert!(parse_input(&input).is_err());
    }

    #[test]
    fn finds_unused_params() {
        let params: Vec<Ident> = vec![parse_quote!(T), parse_quote!(U)];
        let types: Vec<Type> = vec![parse_quote!(Vec<T>), parse_quote!(u8)];
        let unused = unused_params(&params, &types);
        assert_eq!(unused.len(), 1);
        assert_eq!(unused[0].to_string(), "U");
    }
}
