//! Derive macros for brrtbind.
//!
//! - `#[derive(Describe)]` on structs and unit enums used in request and response bodies
//! - `#[derive(Input)]` on request input structs; also implements `Describe`
//! - `#[derive(Output)]` on response structs
//!
//! Field and container options live in `#[bind(...)]` for `Describe`/`Input`
//! and `#[output(...)]` for `Output`. `#[serde(...)]` renames, defaults and
//! skips are honoured so schemas match the wire format.

use proc_macro::TokenStream;
use proc_macro2::{Literal, TokenStream as TokenStream2};
use quote::quote;
use syn::ext::IdentExt;
use syn::meta::ParseNestedMeta;
use syn::{
    parse_macro_input, parse_quote, Attribute, Data, DataEnum, DeriveInput, Expr, ExprLit,
    ExprUnary, Fields, GenericArgument, Generics, Lit, LitStr, PathArguments, Token, Type, UnOp,
};

#[proc_macro_derive(Describe, attributes(bind))]
pub fn derive_describe(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_describe(&input, Mode::Describe)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

#[proc_macro_derive(Input, attributes(bind))]
pub fn derive_input(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let describe = match expand_describe(&input, Mode::Input) {
        Ok(tokens) => tokens,
        Err(err) => return err.into_compile_error().into(),
    };
    let input_impl = expand_input(&input).unwrap_or_else(syn::Error::into_compile_error);
    quote!(#describe #input_impl).into()
}

#[proc_macro_derive(Output, attributes(output))]
pub fn derive_output(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_output(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Describe,
    Input,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Role {
    Property,
    Path,
    Query,
    Header,
    Body,
    RawBody,
}

impl Role {
    fn tokens(self) -> TokenStream2 {
        match self {
            Role::Property => quote!(::brrtbind::__private::FieldRole::Property),
            Role::Path => quote!(::brrtbind::__private::FieldRole::Path),
            Role::Query => quote!(::brrtbind::__private::FieldRole::Query),
            Role::Header => quote!(::brrtbind::__private::FieldRole::Header),
            Role::Body => quote!(::brrtbind::__private::FieldRole::Body),
            Role::RawBody => quote!(::brrtbind::__private::FieldRole::RawBody),
        }
    }

    fn source(self) -> &'static str {
        match self {
            Role::Property => "",
            Role::Path => "path",
            Role::Query => "query",
            Role::Header => "header",
            Role::Body | Role::RawBody => "body",
        }
    }
}

// ---------------------------------------------------------------------------
// Attribute parsing
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ContainerAttrs {
    schema_name: Option<LitStr>,
    resolve: bool,
    deny_unknown: bool,
    rename_all: Option<String>,
    serde_default: bool,
}

impl ContainerAttrs {
    fn parse(attrs: &[Attribute]) -> syn::Result<Self> {
        let mut out = Self::default();
        for attr in attrs {
            if attr.path().is_ident("bind") {
                attr.parse_nested_meta(|meta| {
                    if meta.path.is_ident("schema_name") {
                        out.schema_name = Some(meta.value()?.parse()?);
                    } else if meta.path.is_ident("resolve") {
                        out.resolve = true;
                    } else if meta.path.is_ident("deny_unknown") {
                        out.deny_unknown = true;
                    } else {
                        return Err(meta.error("unknown bind container option"));
                    }
                    Ok(())
                })?;
            } else if attr.path().is_ident("serde") {
                attr.parse_nested_meta(|meta| {
                    if meta.path.is_ident("rename_all") && meta.input.peek(Token![=]) {
                        let lit: LitStr = meta.value()?.parse()?;
                        out.rename_all = Some(lit.value());
                    } else if meta.path.is_ident("deny_unknown_fields") {
                        out.deny_unknown = true;
                    } else if meta.path.is_ident("default") {
                        out.serde_default = true;
                        skip_value(&meta)?;
                    } else {
                        skip_value(&meta)?;
                    }
                    Ok(())
                })?;
            }
        }
        Ok(out)
    }
}

#[derive(Default)]
struct FieldAttrs {
    role: Option<(Role, Option<LitStr>)>,
    required: Option<bool>,
    default: Option<String>,
    min_length: Option<Expr>,
    max_length: Option<Expr>,
    minimum: Option<Expr>,
    maximum: Option<Expr>,
    exclusive_minimum: Option<Expr>,
    exclusive_maximum: Option<Expr>,
    min_items: Option<Expr>,
    max_items: Option<Expr>,
    pattern: Option<LitStr>,
    enum_values: Option<LitStr>,
    format: Option<LitStr>,
    time_format: Option<LitStr>,
    content_type: Option<LitStr>,
    read_only: bool,
    skip: bool,
    rename: Option<String>,
    serde_default: bool,
}

impl FieldAttrs {
    fn parse(attrs: &[Attribute]) -> syn::Result<Self> {
        let mut out = Self::default();
        for attr in attrs {
            if attr.path().is_ident("bind") {
                attr.parse_nested_meta(|meta| out.parse_bind(&meta))?;
            } else if attr.path().is_ident("serde") {
                attr.parse_nested_meta(|meta| {
                    if meta.path.is_ident("rename") && meta.input.peek(Token![=]) {
                        let lit: LitStr = meta.value()?.parse()?;
                        out.rename = Some(lit.value());
                    } else if meta.path.is_ident("default") {
                        out.serde_default = true;
                        skip_value(&meta)?;
                    } else if meta.path.is_ident("skip") || meta.path.is_ident("skip_deserializing")
                    {
                        out.skip = true;
                    } else {
                        skip_value(&meta)?;
                    }
                    Ok(())
                })?;
            }
        }
        Ok(out)
    }

    fn parse_bind(&mut self, meta: &ParseNestedMeta<'_>) -> syn::Result<()> {
        let key = meta
            .path
            .get_ident()
            .map(|i| i.to_string())
            .unwrap_or_default();
        match key.as_str() {
            "path" => self.set_role(Role::Path, meta)?,
            "query" => self.set_role(Role::Query, meta)?,
            "header" => self.set_role(Role::Header, meta)?,
            "body" => self.set_role(Role::Body, meta)?,
            "raw_body" => self.set_role(Role::RawBody, meta)?,
            "required" => {
                self.required = Some(if meta.input.peek(Token![=]) {
                    meta.value()?.parse::<syn::LitBool>()?.value
                } else {
                    true
                });
            }
            "default" => {
                let expr: Expr = meta.value()?.parse()?;
                self.default = Some(literal_string(&expr)?);
            }
            "min_length" => self.min_length = Some(meta.value()?.parse()?),
            "max_length" => self.max_length = Some(meta.value()?.parse()?),
            "minimum" => self.minimum = Some(meta.value()?.parse()?),
            "maximum" => self.maximum = Some(meta.value()?.parse()?),
            "exclusive_minimum" => self.exclusive_minimum = Some(meta.value()?.parse()?),
            "exclusive_maximum" => self.exclusive_maximum = Some(meta.value()?.parse()?),
            "min_items" => self.min_items = Some(meta.value()?.parse()?),
            "max_items" => self.max_items = Some(meta.value()?.parse()?),
            "pattern" => self.pattern = Some(meta.value()?.parse()?),
            "enum_values" => self.enum_values = Some(meta.value()?.parse()?),
            "format" => self.format = Some(meta.value()?.parse()?),
            "time_format" => self.time_format = Some(meta.value()?.parse()?),
            "content_type" => self.content_type = Some(meta.value()?.parse()?),
            "read_only" => self.read_only = true,
            "skip" => self.skip = true,
            _ => return Err(meta.error("unknown bind option")),
        }
        Ok(())
    }

    fn set_role(&mut self, role: Role, meta: &ParseNestedMeta<'_>) -> syn::Result<()> {
        if self.role.is_some() {
            return Err(meta.error("a field can have only one binding source"));
        }
        let name = if meta.input.peek(Token![=]) {
            Some(meta.value()?.parse::<LitStr>()?)
        } else {
            None
        };
        self.role = Some((role, name));
        Ok(())
    }

    fn tags(&self) -> syn::Result<TokenStream2> {
        let min_length = numeric(&self.min_length, false)?;
        let max_length = numeric(&self.max_length, false)?;
        let minimum = numeric(&self.minimum, true)?;
        let maximum = numeric(&self.maximum, true)?;
        let exclusive_minimum = numeric(&self.exclusive_minimum, true)?;
        let exclusive_maximum = numeric(&self.exclusive_maximum, true)?;
        let min_items = numeric(&self.min_items, false)?;
        let max_items = numeric(&self.max_items, false)?;
        let pattern = opt_str(self.pattern.as_ref());
        let format = opt_str(self.format.as_ref());
        let time_format = opt_str(self.time_format.as_ref());
        let enum_values: Vec<String> = self
            .enum_values
            .as_ref()
            .map(|lit| {
                lit.value()
                    .split(',')
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        let read_only = self.read_only;
        Ok(quote! {
            ::brrtbind::__private::Tags {
                min_length: #min_length,
                max_length: #max_length,
                minimum: #minimum,
                maximum: #maximum,
                exclusive_minimum: #exclusive_minimum,
                exclusive_maximum: #exclusive_maximum,
                min_items: #min_items,
                max_items: #max_items,
                pattern: #pattern,
                enum_values: &[#(#enum_values),*],
                format: #format,
                time_format: #time_format,
                read_only: #read_only,
            }
        })
    }
}

/// Consume the value of an option we do not interpret.
fn skip_value(meta: &ParseNestedMeta<'_>) -> syn::Result<()> {
    if meta.input.peek(Token![=]) {
        meta.value()?.parse::<Expr>()?;
    } else if meta.input.peek(syn::token::Paren) {
        let content;
        syn::parenthesized!(content in meta.input);
        content.parse::<TokenStream2>()?;
    }
    Ok(())
}

/// Literal default as written, e.g. `10`, `-1.5`, `true` or `"a,b"`.
fn literal_string(expr: &Expr) -> syn::Result<String> {
    match expr {
        Expr::Lit(ExprLit { lit, .. }) => match lit {
            Lit::Str(s) => Ok(s.value()),
            Lit::Int(i) => Ok(i.base10_digits().to_string()),
            Lit::Float(f) => Ok(f.base10_digits().to_string()),
            Lit::Bool(b) => Ok(b.value.to_string()),
            other => Err(syn::Error::new(other.span(), "unsupported default literal")),
        },
        Expr::Unary(ExprUnary {
            op: UnOp::Neg(_),
            expr,
            ..
        }) => Ok(format!("-{}", literal_string(expr)?)),
        other => Err(syn::Error::new_spanned(other, "default must be a literal")),
    }
}

/// Constraint value as `Option<f64>` or `Option<u64>` tokens.
fn numeric(expr: &Option<Expr>, float: bool) -> syn::Result<TokenStream2> {
    let Some(expr) = expr else {
        return Ok(quote!(::core::option::Option::None));
    };
    let literal = match literal_string(expr) {
        Ok(text) if matches!(expr, Expr::Lit(_) | Expr::Unary(_)) => Some(text),
        _ => None,
    };
    let tokens = match (literal, float) {
        (Some(text), true) => {
            let value: f64 = text
                .parse()
                .map_err(|_| syn::Error::new_spanned(expr, "expected a number"))?;
            let lit = Literal::f64_suffixed(value);
            quote!(#lit)
        }
        (Some(text), false) => {
            let value: u64 = text
                .parse()
                .map_err(|_| syn::Error::new_spanned(expr, "expected a non-negative integer"))?;
            let lit = Literal::u64_suffixed(value);
            quote!(#lit)
        }
        (None, true) => quote!((#expr) as f64),
        (None, false) => quote!((#expr) as u64),
    };
    Ok(quote!(::core::option::Option::Some(#tokens)))
}

fn opt_str(lit: Option<&LitStr>) -> TokenStream2 {
    match lit {
        Some(lit) => quote!(::core::option::Option::Some(#lit)),
        None => quote!(::core::option::Option::None),
    }
}

fn opt_string(value: Option<&str>) -> TokenStream2 {
    match value {
        Some(value) => quote!(::core::option::Option::Some(#value)),
        None => quote!(::core::option::Option::None),
    }
}

fn doc_string(attrs: &[Attribute]) -> Option<String> {
    let lines: Vec<String> = attrs
        .iter()
        .filter(|a| a.path().is_ident("doc"))
        .filter_map(|a| match &a.meta {
            syn::Meta::NameValue(nv) => match &nv.value {
                Expr::Lit(ExprLit {
                    lit: Lit::Str(s), ..
                }) => Some(s.value().trim().to_string()),
                _ => None,
            },
            _ => None,
        })
        .collect();
    let doc = lines.join("\n").trim().to_string();
    (!doc.is_empty()).then_some(doc)
}

// ---------------------------------------------------------------------------
// Type helpers
// ---------------------------------------------------------------------------

fn last_segment(ty: &Type) -> Option<&syn::PathSegment> {
    match ty {
        Type::Path(p) if p.qself.is_none() => p.path.segments.last(),
        _ => None,
    }
}

fn single_type_arg(segment: &syn::PathSegment) -> Option<&Type> {
    match &segment.arguments {
        PathArguments::AngleBracketed(args) if args.args.len() == 1 => match args.args.first() {
            Some(GenericArgument::Type(ty)) => Some(ty),
            _ => None,
        },
        _ => None,
    }
}

fn option_inner(ty: &Type) -> Option<&Type> {
    let segment = last_segment(ty)?;
    if segment.ident != "Option" {
        return None;
    }
    single_type_arg(segment)
}

fn is_unit(ty: &Type) -> bool {
    matches!(ty, Type::Tuple(t) if t.elems.is_empty())
}

fn is_byte_vec(ty: &Type) -> bool {
    last_segment(ty).is_some_and(|segment| {
        segment.ident == "Vec"
            && single_type_arg(segment)
                .and_then(last_segment)
                .is_some_and(|inner| inner.ident == "u8")
    })
}

fn add_describe_bounds(generics: &Generics) -> Generics {
    let mut generics = generics.clone();
    let params: Vec<_> = generics.type_params().map(|p| p.ident.clone()).collect();
    let where_clause = generics.make_where_clause();
    for ident in params {
        where_clause
            .predicates
            .push(parse_quote!(#ident: ::brrtbind::schema::Describe));
    }
    generics
}

// ---------------------------------------------------------------------------
// Naming
// ---------------------------------------------------------------------------

fn rename_field(rule: &str, name: &str) -> String {
    let pascal = || -> String {
        name.split('_')
            .filter(|w| !w.is_empty())
            .map(capitalize)
            .collect()
    };
    match rule {
        "UPPERCASE" | "SCREAMING_SNAKE_CASE" => name.to_ascii_uppercase(),
        "PascalCase" => pascal(),
        "camelCase" => lower_first(&pascal()),
        "kebab-case" => name.replace('_', "-"),
        "SCREAMING-KEBAB-CASE" => name.to_ascii_uppercase().replace('_', "-"),
        _ => name.to_string(),
    }
}

fn rename_variant(rule: &str, name: &str) -> String {
    let snake = || -> String {
        let mut out = String::with_capacity(name.len() + 4);
        for (i, c) in name.char_indices() {
            if i > 0 && c.is_uppercase() {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        }
        out
    };
    match rule {
        "lowercase" => name.to_ascii_lowercase(),
        "UPPERCASE" => name.to_ascii_uppercase(),
        "camelCase" => lower_first(name),
        "snake_case" => snake(),
        "SCREAMING_SNAKE_CASE" => snake().to_ascii_uppercase(),
        "kebab-case" => snake().replace('_', "-"),
        "SCREAMING-KEBAB-CASE" => snake().to_ascii_uppercase().replace('_', "-"),
        _ => name.to_string(),
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn lower_first(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `if_none_match` becomes `If-None-Match`.
fn header_case(name: &str) -> String {
    name.split('_')
        .filter(|w| !w.is_empty())
        .map(capitalize)
        .collect::<Vec<_>>()
        .join("-")
}

// ---------------------------------------------------------------------------
// Describe / Input
// ---------------------------------------------------------------------------

struct FieldPlan {
    ident: syn::Ident,
    role: Role,
    skip: bool,
    /// Walk segment and bound-input key.
    location: String,
}

fn plan_fields(input: &DeriveInput, mode: Mode) -> syn::Result<(Vec<FieldPlan>, Vec<TokenStream2>)> {
    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(&input.ident, "expected a struct"));
    };
    let Fields::Named(fields) = &data.fields else {
        if matches!(data.fields, Fields::Unit) && mode == Mode::Input {
            return Ok((Vec::new(), Vec::new()));
        }
        return Err(syn::Error::new_spanned(
            &input.ident,
            "expected a struct with named fields",
        ));
    };
    let container = ContainerAttrs::parse(&input.attrs)?;

    let mut plans = Vec::new();
    let mut descriptions = Vec::new();
    for field in &fields.named {
        let Some(ident) = field.ident.clone() else {
            continue;
        };
        let attrs = FieldAttrs::parse(&field.attrs)?;
        let field_name = ident.unraw().to_string();

        let (role, explicit) = match (&attrs.role, mode) {
            (Some((role, name)), _) => (*role, name.as_ref().map(LitStr::value)),
            (None, Mode::Input) if field_name == "body" => (Role::Body, None),
            (None, Mode::Input) if field_name == "raw_body" => (Role::RawBody, None),
            (None, _) => (Role::Property, None),
        };
        if mode == Mode::Describe && role != Role::Property {
            return Err(syn::Error::new_spanned(
                &ident,
                "binding sources are only valid on #[derive(Input)] types",
            ));
        }

        let wire = match role {
            Role::Property => attrs.rename.clone().unwrap_or_else(|| match &container.rename_all {
                Some(rule) => rename_field(rule, &field_name),
                None => field_name.clone(),
            }),
            Role::Header => explicit.unwrap_or_else(|| header_case(&field_name)),
            Role::Path | Role::Query => explicit.unwrap_or_else(|| field_name.clone()),
            Role::Body | Role::RawBody => field_name.clone(),
        };
        let location = match role {
            Role::Property => wire.clone(),
            Role::Body | Role::RawBody => "body".to_string(),
            role => format!("{}.{}", role.source(), wire),
        };

        if role == Role::RawBody && !is_byte_vec(&field.ty) {
            return Err(syn::Error::new_spanned(&field.ty, "raw body fields must be Vec<u8>"));
        }

        let skip = attrs.skip;
        let optional = option_inner(&field.ty).is_some();
        let (described_ty, body_optional) = match (role, option_inner(&field.ty)) {
            (Role::Body, Some(inner)) => (inner.clone(), true),
            _ => (field.ty.clone(), false),
        };

        plans.push(FieldPlan {
            ident: ident.clone(),
            role,
            skip,
            location,
        });
        if skip {
            continue;
        }

        let required = match role {
            Role::Path => true,
            Role::Query | Role::Header | Role::RawBody => attrs.required.unwrap_or(false),
            Role::Body => attrs.required.unwrap_or(!body_optional),
            Role::Property => attrs.required.unwrap_or(
                !optional
                    && !attrs.serde_default
                    && !container.serde_default
                    && attrs.default.is_none(),
            ),
        };
        let role_tokens = role.tokens();
        let default = opt_string(attrs.default.as_deref());
        let doc = opt_string(doc_string(&field.attrs).as_deref());
        let content_type = opt_str(attrs.content_type.as_ref());
        let tags = attrs.tags()?;
        descriptions.push(quote! {
            ::brrtbind::__private::FieldDescription {
                name: #wire,
                role: #role_tokens,
                ty: ::brrtbind::__private::TypeRef::of::<#described_ty>(),
                required: #required,
                default: #default,
                tags: #tags,
                doc: #doc,
                content_type: #content_type,
            }
        });
    }
    Ok((plans, descriptions))
}

fn expand_describe(input: &DeriveInput, mode: Mode) -> syn::Result<TokenStream2> {
    if let Data::Enum(data) = &input.data {
        if mode == Mode::Input {
            return Err(syn::Error::new_spanned(&input.ident, "inputs must be structs"));
        }
        return expand_enum(input, data);
    }

    let container = ContainerAttrs::parse(&input.attrs)?;
    let (plans, fields) = plan_fields(input, mode)?;
    let ident = &input.ident;
    let generics = add_describe_bounds(&input.generics);
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let schema_name = opt_str(container.schema_name.as_ref());
    let doc = opt_string(doc_string(&input.attrs).as_deref());
    let deny_unknown = container.deny_unknown;
    let visits = plans
        .iter()
        .filter(|p| !p.skip && p.role != Role::RawBody)
        .map(|p| {
            let field = &p.ident;
            let key = &p.location;
            quote!(visit(::brrtbind::__private::Segment::Key(#key), &self.#field);)
        });
    let resolver = container.resolve.then(|| {
        quote! {
            fn resolver(&self) -> ::core::option::Option<&dyn ::brrtbind::binder::Resolver> {
                ::core::option::Option::Some(self)
            }
        }
    });

    Ok(quote! {
        impl #impl_generics ::brrtbind::schema::Describe for #ident #ty_generics #where_clause {
            fn describe() -> ::brrtbind::__private::TypeDescription {
                ::brrtbind::__private::TypeDescription::Struct(
                    ::brrtbind::__private::StructDescription {
                        schema_name: #schema_name,
                        doc: #doc,
                        deny_unknown: #deny_unknown,
                        fields: ::std::vec![#(#fields),*],
                    },
                )
            }

            #[allow(unused_variables)]
            fn walk(&self, visit: &mut ::brrtbind::__private::Visit<'_>) {
                #(#visits)*
            }

            #resolver
        }
    })
}

fn expand_enum(input: &DeriveInput, data: &DataEnum) -> syn::Result<TokenStream2> {
    let container = ContainerAttrs::parse(&input.attrs)?;
    let mut values = Vec::with_capacity(data.variants.len());
    for variant in &data.variants {
        if !matches!(variant.fields, Fields::Unit) {
            return Err(syn::Error::new_spanned(
                variant,
                "only enums with unit variants can be described",
            ));
        }
        let attrs = FieldAttrs::parse(&variant.attrs)?;
        if attrs.skip {
            continue;
        }
        let name = variant.ident.unraw().to_string();
        values.push(attrs.rename.unwrap_or_else(|| match &container.rename_all {
            Some(rule) => rename_variant(rule, &name),
            None => name,
        }));
    }
    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let schema_name = opt_str(container.schema_name.as_ref());
    Ok(quote! {
        impl #impl_generics ::brrtbind::schema::Describe for #ident #ty_generics #where_clause {
            fn describe() -> ::brrtbind::__private::TypeDescription {
                ::brrtbind::__private::TypeDescription::Enum {
                    schema_name: #schema_name,
                    values: &[#(#values),*],
                }
            }
        }
    })
}

fn expand_input(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let (plans, _) = plan_fields(input, Mode::Input)?;
    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let unit = matches!(&input.data, Data::Struct(s) if matches!(s.fields, Fields::Unit));

    let construct = if unit {
        quote!(#ident)
    } else {
        let inits = plans.iter().map(|p| {
            let field = &p.ident;
            let location = &p.location;
            match p.role {
                _ if p.skip => quote!(#field: ::core::default::Default::default()),
                Role::Body => quote!(#field: bound.take_body()?),
                Role::RawBody => quote!(#field: bound.take_raw()),
                // Unbound property fields are rejected at registration.
                _ => quote!(#field: bound.take_param(#location)?),
            }
        });
        quote!(#ident { #(#inits),* })
    };

    Ok(quote! {
        impl #impl_generics ::brrtbind::typed::Input for #ident #ty_generics #where_clause {
            #[allow(unused_variables)]
            fn from_bound(
                bound: &mut ::brrtbind::__private::BoundInput,
            ) -> ::core::result::Result<Self, ::brrtbind::__private::BindError> {
                ::core::result::Result::Ok(#construct)
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ShapeAttrs {
    status: Option<u16>,
    headers: Option<Vec<String>>,
    content_type: Option<LitStr>,
    raw: bool,
}

enum OutputRole {
    Header(String),
    Status,
    Body(ShapeAttrs),
}

fn output_role(field: &syn::Field, name: &str) -> syn::Result<Option<OutputRole>> {
    let mut role = None;
    for attr in field.attrs.iter().filter(|a| a.path().is_ident("output")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("header") {
                let header = if meta.input.peek(Token![=]) {
                    meta.value()?.parse::<LitStr>()?.value()
                } else {
                    header_case(name)
                };
                role = Some(OutputRole::Header(header));
            } else if meta.path.is_ident("status") {
                role = Some(OutputRole::Status);
            } else if meta.path.is_ident("body") {
                let mut shape = ShapeAttrs::default();
                if meta.input.peek(syn::token::Paren) {
                    meta.parse_nested_meta(|inner| {
                        if inner.path.is_ident("status") {
                            let lit: syn::LitInt = inner.value()?.parse()?;
                            shape.status = Some(lit.base10_parse()?);
                        } else if inner.path.is_ident("headers") {
                            let lit: LitStr = inner.value()?.parse()?;
                            shape.headers = Some(
                                lit.value()
                                    .split(',')
                                    .map(|h| h.trim().to_string())
                                    .filter(|h| !h.is_empty())
                                    .collect(),
                            );
                        } else if inner.path.is_ident("content_type") {
                            shape.content_type = Some(inner.value()?.parse()?);
                        } else if inner.path.is_ident("raw") {
                            shape.raw = true;
                        } else {
                            return Err(inner.error("unknown body shape option"));
                        }
                        Ok(())
                    })?;
                }
                role = Some(OutputRole::Body(shape));
            } else {
                return Err(meta.error("unknown output option"));
            }
            Ok(())
        })?;
    }
    Ok(role.or(match name {
        "status" => Some(OutputRole::Status),
        "body" => Some(OutputRole::Body(ShapeAttrs::default())),
        _ => None,
    }))
}

fn expand_output(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let ident = &input.ident;
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => named.named.iter().collect::<Vec<_>>(),
            Fields::Unit => Vec::new(),
            Fields::Unnamed(_) => {
                return Err(syn::Error::new_spanned(
                    ident,
                    "output structs need named fields",
                ))
            }
        },
        _ => return Err(syn::Error::new_spanned(ident, "expected a struct")),
    };

    let mut header_names = Vec::new();
    let mut header_pushes = Vec::new();
    let mut status_stmt = None;
    let mut shapes = Vec::new();
    let mut selections = Vec::new();

    for field in fields {
        let Some(field_ident) = &field.ident else {
            continue;
        };
        let name = field_ident.unraw().to_string();
        let Some(role) = output_role(field, &name)? else {
            return Err(syn::Error::new_spanned(
                field_ident,
                "output fields must be a header, the status or a body",
            ));
        };
        match role {
            OutputRole::Header(header) => {
                header_pushes.push(quote! {
                    parts.headers.push((
                        #header,
                        ::brrtbind::__private::ToHeader::to_header(&self.#field_ident),
                    ));
                });
                header_names.push(header);
            }
            OutputRole::Status => {
                if status_stmt.is_some() {
                    return Err(syn::Error::new_spanned(field_ident, "duplicate status field"));
                }
                status_stmt = Some(quote! {
                    parts.status = ::brrtbind::__private::IntoStatus::into_status(self.#field_ident);
                });
            }
            OutputRole::Body(attrs) => {
                let index = shapes.len();
                let conditional = option_inner(&field.ty);
                let inner = conditional.unwrap_or(&field.ty);
                let (body, payload) = if is_unit(inner) {
                    (
                        quote!(::brrtbind::__private::ShapeBody::Empty),
                        quote!(::brrtbind::__private::Payload::Empty),
                    )
                } else if attrs.raw || is_byte_vec(inner) {
                    (
                        quote!(::brrtbind::__private::ShapeBody::Raw),
                        quote!(::brrtbind::__private::Payload::raw(value)),
                    )
                } else {
                    (
                        quote!(::brrtbind::__private::ShapeBody::Structured(
                            ::brrtbind::__private::TypeRef::of::<#inner>()
                        )),
                        quote!(::brrtbind::__private::Payload::structured(value)),
                    )
                };
                let status = match attrs.status {
                    Some(status) => quote!(::core::option::Option::Some(#status)),
                    None => quote!(::core::option::Option::None),
                };
                let headers = match &attrs.headers {
                    Some(list) => quote!(::core::option::Option::Some(&[#(#list),*] as &[&'static str])),
                    None => quote!(::core::option::Option::None),
                };
                let content_type = opt_str(attrs.content_type.as_ref());
                shapes.push(quote! {
                    ::brrtbind::__private::ShapeDescription {
                        status: #status,
                        headers: #headers,
                        body: #body,
                        content_type: #content_type,
                    }
                });
                let select = if conditional.is_some() {
                    quote! {
                        if let ::core::option::Option::Some(value) = self.#field_ident {
                            parts.selected = ::core::option::Option::Some((#index, #payload));
                        }
                    }
                } else {
                    quote! {
                        let value = self.#field_ident;
                        parts.selected = ::core::option::Option::Some((#index, #payload));
                    }
                };
                selections.push(quote! {
                    if parts.selected.is_none() {
                        #select
                    }
                });
            }
        }
    }

    let dynamic_status = status_stmt.is_some();
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    Ok(quote! {
        impl #impl_generics ::brrtbind::typed::Output for #ident #ty_generics #where_clause {
            fn describe_output() -> ::brrtbind::__private::OutputDescription {
                ::brrtbind::__private::OutputDescription {
                    headers: ::std::vec![#(#header_names),*],
                    shapes: ::std::vec![#(#shapes),*],
                    dynamic_status: #dynamic_status,
                }
            }

            #[allow(unused_mut, unused_variables)]
            fn into_parts(self) -> ::brrtbind::__private::OutputParts {
                let mut parts = ::brrtbind::__private::OutputParts::default();
                #status_stmt
                #(#header_pushes)*
                #(#selections)*
                parts
            }
        }
    })
}
