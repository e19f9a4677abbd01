//! Token generation for the `Stackable` derive.

use crate::parse::{Body, FieldRole, FieldSpec, Input, Style, VariantSpec, type_label, unused_params};
use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::{Ident, LitStr, Member, parse_quote};

/// Resolve the runtime crate path, defaulting to `::stacked_config`.
pub(crate) fn crate_path(path: Option<&syn::Path>) -> TokenStream {
    path.map_or_else(|| quote! { ::stacked_config }, |path| quote! { #path })
}

pub(crate) fn expand(input: &Input) -> TokenStream {
    let krate = crate_path(input.attrs.crate_path.as_ref());
    if input.is_atomic() {
        let deep_copy = deep_copy_impl(input, &krate);
        let stackable = atomic_stackable_impl(input, &krate);
        quote! { #deep_copy #stackable }
    } else {
        let Body::Struct { style, fields } = &input.body else {
            unreachable!("enums are atomic");
        };
        let shadow = ShadowStruct::new(input, *style, fields);
        let shadow_def = shadow.definition(input, &krate);
        let shadow_copy = shadow.deep_copy_impl(input, &krate);
        let deep_copy = deep_copy_impl(input, &krate);
        let stackable = shadow.stackable_impl(input, &krate);
        let schema = schema_impl(input, fields, &krate);
        quote! {
            #shadow_def
            #shadow_copy
            #deep_copy
            #stackable
            #schema
        }
    }
}

/// Generics with `bound` added to every type parameter.
fn bounded(input: &Input, bound: TokenStream) -> syn::Generics {
    let mut generics = input.generics.clone();
    for param in generics.type_params_mut() {
        param.bounds.push(parse_quote!(#bound));
    }
    generics
}

fn copy_expr(field: &FieldSpec, access: TokenStream, krate: &TokenStream) -> TokenStream {
    match field.role {
        FieldRole::ByRef => quote! { ::core::clone::Clone::clone(#access) },
        FieldRole::Shadowed | FieldRole::Copied => {
            quote! { #krate::DeepCopy::deep_copy_in(#access, ctx) }
        }
    }
}

fn binding(member: &Member) -> Ident {
    match member {
        Member::Named(ident) => format_ident!("__{}", ident),
        Member::Unnamed(index) => format_ident!("__{}", index.index),
    }
}

fn variant_arm(ident: &Ident, variant: &VariantSpec, krate: &TokenStream) -> TokenStream {
    let name = &variant.ident;
    let members: Vec<_> = variant.fields.iter().map(|f| &f.member).collect();
    let bindings: Vec<_> = members.iter().map(|m| binding(m)).collect();
    let copies = variant
        .fields
        .iter()
        .zip(&bindings)
        .map(|(field, bind)| copy_expr(field, quote! { #bind }, krate));
    match variant.style {
        Style::Unit => quote! { #ident::#name => #ident::#name },
        Style::Named | Style::Tuple => quote! {
            #ident::#name { #( #members: #bindings ),* } => #ident::#name { #( #members: #copies ),* }
        },
    }
}

fn deep_copy_impl(input: &Input, krate: &TokenStream) -> TokenStream {
    let ident = &input.ident;
    let generics = bounded(input, quote! { #krate::DeepCopy });
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let body = match &input.body {
        Body::Struct { fields, .. } => {
            let members = fields.iter().map(|f| &f.member);
            let copies = fields.iter().map(|f| {
                let member = &f.member;
                copy_expr(f, quote! { &self.#member }, krate)
            });
            quote! { Self { #( #members: #copies ),* } }
        }
        Body::Enum(variants) if variants.is_empty() => quote! { match *self {} },
        Body::Enum(variants) => {
            let arms = variants.iter().map(|v| variant_arm(ident, v, krate));
            quote! { match self { #( #arms, )* } }
        }
    };

    quote! {
        impl #impl_generics #krate::DeepCopy for #ident #ty_generics #where_clause {
            #[allow(unused_variables)]
            fn deep_copy_in(&self, ctx: &mut #krate::CopyContext) -> Self {
                #body
            }
        }
    }
}

fn atomic_stackable_impl(input: &Input, krate: &TokenStream) -> TokenStream {
    let ident = &input.ident;
    let generics = bounded(
        input,
        quote! { #krate::DeepCopy + ::core::fmt::Debug + ::core::marker::Send + ::core::marker::Sync + 'static },
    );
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    quote! {
        impl #impl_generics #krate::Stackable for #ident #ty_generics #where_clause {
            type Present = Self;
            const KIND: #krate::FieldKind = #krate::FieldKind::Atomic;

            fn into_shadow(self) -> ::core::option::Option<Self> {
                ::core::option::Option::Some(self)
            }

            fn overlay(
                &mut self,
                shadow: ::core::option::Option<Self>,
                _path: &mut #krate::FieldPath,
            ) -> ::core::result::Result<(), #krate::OverlayError> {
                if let ::core::option::Option::Some(value) = shadow {
                    *self = value;
                }
                ::core::result::Result::Ok(())
            }

            fn materialize(
                present: Self,
                _path: &mut #krate::FieldPath,
            ) -> ::core::result::Result<Self, #krate::OverlayError> {
                ::core::result::Result::Ok(present)
            }
        }
    }
}

/// One field of the generated shadow.
struct ShadowField<'a> {
    spec: &'a FieldSpec,
    /// The field's member in the shadow, renumbered for tuple structs.
    member: Member,
}

struct ShadowStruct<'a> {
    ident: Ident,
    tuple: bool,
    fields: Vec<ShadowField<'a>>,
    /// Type parameters no shadowed field mentions.
    phantom: Vec<&'a Ident>,
}

impl<'a> ShadowStruct<'a> {
    fn new(input: &'a Input, style: Style, fields: &'a [FieldSpec]) -> Self {
        let shadowed: Vec<_> = fields
            .iter()
            .filter(|f| f.role == FieldRole::Shadowed)
            .enumerate()
            .map(|(index, spec)| ShadowField {
                spec,
                member: match &spec.member {
                    Member::Named(ident) => Member::Named(ident.clone()),
                    Member::Unnamed(_) => Member::Unnamed(index.into()),
                },
            })
            .collect();

        let params: Vec<Ident> = input.generics.type_params().map(|p| p.ident.clone()).collect();
        let phantom = unused_params(&params, shadowed.iter().map(|f| &f.spec.ty))
            .into_iter()
            .filter_map(|unused| input.generics.type_params().map(|p| &p.ident).find(|p| *p == unused))
            .collect();

        Self {
            ident: input
                .attrs
                .shadow
                .clone()
                .unwrap_or_else(|| format_ident!("{}Shadow", input.ident)),
            tuple: style == Style::Tuple && !shadowed.is_empty(),
            fields: shadowed,
            phantom,
        }
    }

    fn marker_member(&self) -> Member {
        if self.tuple {
            Member::Unnamed(self.fields.len().into())
        } else {
            Member::Named(format_ident!("__phantom"))
        }
    }

    fn definition(&self, input: &Input, krate: &TokenStream) -> TokenStream {
        let vis = &input.vis;
        let ident = &self.ident;
        let derives = &input.attrs.derives;
        let generics = bounded(input, quote! { #krate::Stackable });
        let (params, _, where_clause) = generics.split_for_impl();

        let doc = format!(
            "Presence-aware shadow of [`{}`]: every field is `None` unless a source sets it.",
            input.ident
        );
        let fields = self.fields.iter().map(|f| {
            let docs = &f.spec.docs;
            let vis = &f.spec.vis;
            let ty = &f.spec.ty;
            let ty = quote! { ::core::option::Option<<#ty as #krate::Stackable>::Present> };
            match &f.member {
                Member::Named(name) => quote! { #( #docs )* #vis #name: #ty },
                Member::Unnamed(_) => quote! { #( #docs )* #vis #ty },
            }
        });
        let phantom = &self.phantom;
        let marker = (!phantom.is_empty()).then(|| {
            let ty = quote! { ::core::marker::PhantomData<fn() -> ( #( #phantom, )* )> };
            if self.tuple {
                quote! { #[doc(hidden)] pub #ty }
            } else {
                quote! { #[doc(hidden)] pub __phantom: #ty }
            }
        });
        let all_fields = fields.chain(marker);

        if self.tuple {
            quote! {
                #[doc = #doc]
                #[derive(Debug, Default #(, #derives )*)]
                #vis struct #ident #params ( #( #all_fields ),* ) #where_clause;
            }
        } else {
            quote! {
                #[doc = #doc]
                #[derive(Debug, Default #(, #derives )*)]
                #vis struct #ident #params #where_clause { #( #all_fields ),* }
            }
        }
    }

    fn deep_copy_impl(&self, input: &Input, krate: &TokenStream) -> TokenStream {
        let ident = &self.ident;
        let generics = bounded(input, quote! { #krate::Stackable });
        let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();
        let members: Vec<_> = self.fields.iter().map(|f| &f.member).collect();
        let marker = (!self.phantom.is_empty()).then(|| {
            let member = self.marker_member();
            quote! { #member: ::core::marker::PhantomData, }
        });

        quote! {
            impl #impl_generics #krate::DeepCopy for #ident #ty_generics #where_clause {
                #[allow(unused_variables)]
                fn deep_copy_in(&self, ctx: &mut #krate::CopyContext) -> Self {
                    Self {
                        #( #members: #krate::DeepCopy::deep_copy_in(&self.#members, ctx), )*
                        #marker
                    }
                }
            }
        }
    }

    fn stackable_impl(&self, input: &Input, krate: &TokenStream) -> TokenStream {
        let ident = &input.ident;
        let shadow = &self.ident;
        let generics = bounded(input, quote! { #krate::Stackable });
        let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();
        let mut where_clause = where_clause.cloned().unwrap_or_else(|| parse_quote!(where));
        where_clause
            .predicates
            .push(parse_quote!(#ident #ty_generics: ::core::default::Default));

        let source: Vec<_> = self.fields.iter().map(|f| &f.spec.member).collect();
        let target: Vec<_> = self.fields.iter().map(|f| &f.member).collect();
        let names: Vec<_> = self
            .fields
            .iter()
            .map(|f| LitStr::new(&f.spec.name, proc_macro2::Span::call_site()))
            .collect();
        let marker = (!self.phantom.is_empty()).then(|| {
            let member = self.marker_member();
            quote! { #member: ::core::marker::PhantomData, }
        });

        quote! {
            impl #impl_generics #krate::Stackable for #ident #ty_generics #where_clause {
                type Present = #shadow #ty_generics;
                const KIND: #krate::FieldKind = #krate::FieldKind::Struct;

                fn into_shadow(self) -> ::core::option::Option<Self::Present> {
                    ::core::option::Option::Some(#shadow {
                        #( #target: #krate::Stackable::into_shadow(self.#source), )*
                        #marker
                    })
                }

                #[allow(unused_variables)]
                fn overlay(
                    &mut self,
                    shadow: ::core::option::Option<Self::Present>,
                    path: &mut #krate::FieldPath,
                ) -> ::core::result::Result<(), #krate::OverlayError> {
                    let ::core::option::Option::Some(shadow) = shadow else {
                        return ::core::result::Result::Ok(());
                    };
                    #(
                        path.push(#names);
                        #krate::Stackable::overlay(&mut self.#source, shadow.#target, path)?;
                        path.pop();
                    )*
                    ::core::result::Result::Ok(())
                }

                fn materialize(
                    present: Self::Present,
                    path: &mut #krate::FieldPath,
                ) -> ::core::result::Result<Self, #krate::OverlayError> {
                    let mut out = <Self as ::core::default::Default>::default();
                    #krate::Stackable::overlay(&mut out, ::core::option::Option::Some(present), path)?;
                    ::core::result::Result::Ok(out)
                }
            }
        }
    }
}

fn schema_impl(input: &Input, fields: &[FieldSpec], krate: &TokenStream) -> TokenStream {
    let ident = &input.ident;
    let generics = bounded(input, quote! { #krate::Stackable });
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();
    let mut where_clause = where_clause.cloned().unwrap_or_else(|| parse_quote!(where));
    where_clause
        .predicates
        .push(parse_quote!(#ident #ty_generics: ::core::default::Default));

    let infos = fields.iter().filter(|f| f.role == FieldRole::Shadowed).map(|f| {
        let name = &f.name;
        let ty = &f.ty;
        let label = type_label(ty);
        quote! {
            #krate::FieldInfo {
                name: #name,
                kind: <#ty as #krate::Stackable>::KIND,
                type_name: #label,
            }
        }
    });
    let verify = input.attrs.verify.then(|| {
        quote! {
            fn verify(&self) -> ::core::result::Result<(), #krate::VerifyError> {
                <Self as #krate::Verify>::verify(self)
            }
        }
    });

    quote! {
        impl #impl_generics #krate::Schema for #ident #ty_generics #where_clause {
            const FIELDS: &'static [#krate::FieldInfo] = &[ #( #infos ),* ];
            #verify
        }
    }
}
